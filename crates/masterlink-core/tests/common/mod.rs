#![allow(dead_code)]

pub mod loopback;
pub mod scripted_master;
