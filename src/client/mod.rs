//! Client side of the tracking core: the cart, live tracking and search.
//!
//! Everything here talks to the order store through the [`gateway`] traits,
//! either over HTTP ([`http::HttpGateway`]) or in process
//! ([`local::InProcessGateway`]).

pub mod cart;
pub mod epoch;
pub mod gateway;
pub mod http;
pub mod local;
pub mod search;
pub mod tracking;
