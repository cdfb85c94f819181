pub mod background;
pub mod content_type;
pub mod edge_cache;
pub mod memory_store;
pub mod object_store;
pub mod sqlite_store;
pub mod webdav;
