//! HTTP request handlers.

pub(crate) mod demo;
pub(crate) mod identity;
pub(crate) mod index;
pub(crate) mod pages;
pub(crate) mod reload;
