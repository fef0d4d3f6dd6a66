pub mod order;
pub mod order_item;

pub use order::{Entity as Order, OrderStatus, ShippingAddress, ShippingInfo};
pub use order_item::Entity as OrderItem;
