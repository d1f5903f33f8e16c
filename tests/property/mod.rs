mod cache_key;
mod eviction;
