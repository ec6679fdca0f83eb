//! Order execution port trait.
//!
//! The only seam that differs between historical replay and live trading:
//! a recorder in one case, a broker connection in the other.

use crate::domain::error::TraderError;
use crate::domain::position::Direction;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order-{}", self.0)
    }
}

pub trait ExecutionGateway {
    fn place_order(&mut self, direction: Direction, price: f64) -> Result<OrderId, TraderError>;

    fn close_order(&mut self, order: OrderId, price: f64) -> Result<(), TraderError>;
}

impl<G: ExecutionGateway + ?Sized> ExecutionGateway for Box<G> {
    fn place_order(&mut self, direction: Direction, price: f64) -> Result<OrderId, TraderError> {
        (**self).place_order(direction, price)
    }

    fn close_order(&mut self, order: OrderId, price: f64) -> Result<(), TraderError> {
        (**self).close_order(order, price)
    }
}
