pub mod camera;
pub mod command_source;
pub mod error;
pub mod logging;
pub mod picker_loop;
