pub mod hosts;
#[cfg(feature = "scripting")]
pub mod script;
