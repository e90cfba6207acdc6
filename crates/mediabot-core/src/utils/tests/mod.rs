#![cfg(test)]

pub mod fs_tests;
