#![allow(dead_code)]

pub mod concurrent;
pub mod delay;
pub mod digital;
