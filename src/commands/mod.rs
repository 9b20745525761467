pub mod selftest;
pub mod symbols;
