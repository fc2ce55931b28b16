//! # Databus Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── src/integration/   # Router ⇄ member runtime ⇄ handler flows
//! └── benches/           # Matching throughput (shard index vs scan)
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p databus-tests
//! cargo test -p databus-tests integration::
//! cargo bench -p databus-tests
//! ```

pub mod integration;
