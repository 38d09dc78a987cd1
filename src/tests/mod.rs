pub mod support;

mod app;
