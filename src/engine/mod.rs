pub mod catalog;
pub mod checkout;
pub mod lifecycle;
pub mod locations;
pub mod orders;
