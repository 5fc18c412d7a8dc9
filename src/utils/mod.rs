pub mod object_store_cache;
