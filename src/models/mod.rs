pub mod cart;
pub mod courier;
pub mod event;
pub mod item;
pub mod order;
