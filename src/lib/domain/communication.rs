//! Email model, delivery contract and the ports it relies on

pub mod backend;
pub mod email;
pub mod transport;

#[cfg(test)]
pub(crate) mod fixtures;
