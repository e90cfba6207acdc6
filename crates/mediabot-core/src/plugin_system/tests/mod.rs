#![cfg(test)]

mod support;

pub mod args_tests;
pub mod loader_tests;
