pub mod api;
pub mod configs;
pub mod constants;
pub mod i18n;
pub mod modules;
pub mod platform;
pub mod utils;

#[cfg(test)]
mod test;
