//! Production-queue and transport-allocation coordinators (C9).
//!
//! Each enforces a single-writer invariant over the resource it owns (a
//! producer's queue, a mover's service-requester slot): a match is proposed
//! and then independently accepted/rejected by the resource owner rather
//! than assumed. Resolved as plain synchronous function calls from
//! the product state machine rather than as additional round-tripped
//! events: §9 describes these coordinators as "plain task handlers", and
//! §5's single-update-thread architecture has no real thread boundary
//! between a product actor and the coordinators it calls.

use bevy_ecs::prelude::Entity;

use crate::mover::{Mover, MoverState};
use crate::producer::Producer;

/// `RequestTransportAllocation(product, mover)`: succeeds only if the mover
/// is still Alive and unclaimed at the moment the request is serviced,
/// guarding against a stale proposal racing a second claim within the same
/// tick.
pub fn request_transport_allocation(mover: &mut Mover, product: Entity) -> bool {
    if mover.state == MoverState::Alive && mover.service_requester.is_none() {
        mover.service_requester = Some(product);
        true
    } else {
        false
    }
}

/// `RequestQueueProduction(product, producer)`: succeeds only if the
/// producer is still Alive and has queue room left.
pub fn request_queue_production(producer: &mut Producer, product: Entity) -> bool {
    if producer.state == crate::producer::ProducerState::Alive && !producer.is_queue_full() {
        producer.queue.push_back(product);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Rect, Vec2};
    use crate::mover::MoverModel;
    use crate::producer::ProducerState;

    #[test]
    fn transport_allocation_rejects_already_claimed_mover() {
        let mut mover = Mover {
            id: crate::mover::MoverId::new("forklift", 1),
            model: MoverModel("forklift".into()),
            state: MoverState::Alive,
            service_requester: Some(Entity::PLACEHOLDER),
        };
        let granted = request_transport_allocation(&mut mover, Entity::from_raw(99));
        assert!(!granted);
    }

    #[test]
    fn queue_production_rejects_full_queue() {
        let mut producer = Producer::new(
            "p1".into(),
            Vec2::ZERO,
            Rect::from_center(Vec2::ZERO, Vec2::new(2.0, 2.0)),
            1,
        );
        producer.queue.push_back(Entity::PLACEHOLDER);
        let granted = request_queue_production(&mut producer, Entity::from_raw(1));
        assert!(!granted);
    }

    #[test]
    fn queue_production_rejects_blocked_producer() {
        let mut producer = Producer::new(
            "p1".into(),
            Vec2::ZERO,
            Rect::from_center(Vec2::ZERO, Vec2::new(2.0, 2.0)),
            5,
        );
        producer.state = ProducerState::Blocked;
        let granted = request_queue_production(&mut producer, Entity::from_raw(1));
        assert!(!granted);
    }
}
