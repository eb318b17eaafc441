pub mod calendar;
pub mod client;
pub mod contacts;
pub mod mail;

pub use client::GraphClient;
