//! Wire protocol codecs. Currently ships one illustrative codec
//! (§4.6); full multi-transport protocol support is out of scope
//! (see SPEC_FULL.md Non-goals).

pub mod c37118;
