//! Execution gateway for historical replay: accepts every order and keeps
//! a log of what would have been sent to a broker.

use crate::domain::error::TraderError;
use crate::domain::position::Direction;
use crate::ports::execution_port::{ExecutionGateway, OrderId};

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Placed {
        order: OrderId,
        direction: Direction,
        price: f64,
    },
    Closed {
        order: OrderId,
        price: f64,
    },
}

#[derive(Debug, Default)]
pub struct RecordingGateway {
    events: Vec<OrderEvent>,
    next_order: u64,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    pub fn placed_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, OrderEvent::Placed { .. }))
            .count()
    }

    pub fn closed_count(&self) -> usize {
        self.events.len() - self.placed_count()
    }
}

impl ExecutionGateway for RecordingGateway {
    fn place_order(&mut self, direction: Direction, price: f64) -> Result<OrderId, TraderError> {
        self.next_order += 1;
        let order = OrderId(self.next_order);
        self.events.push(OrderEvent::Placed {
            order,
            direction,
            price,
        });
        Ok(order)
    }

    fn close_order(&mut self, order: OrderId, price: f64) -> Result<(), TraderError> {
        let known = self
            .events
            .iter()
            .any(|e| matches!(e, OrderEvent::Placed { order: o, .. } if *o == order));
        if !known {
            return Err(TraderError::Gateway {
                reason: format!("unknown order {order}"),
            });
        }
        self.events.push(OrderEvent::Closed { order, price });
        Ok(())
    }
}
