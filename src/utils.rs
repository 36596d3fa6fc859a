pub mod call_on_drop;
pub mod lru;
pub mod varint;
