#![cfg(test)]

pub mod types_tests;
