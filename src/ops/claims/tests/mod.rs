mod common;
mod gate;
mod service;
