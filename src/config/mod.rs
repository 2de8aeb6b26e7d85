pub mod lua_api;

pub use lua_api::parse_lua_config;
