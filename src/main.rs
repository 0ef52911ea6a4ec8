//! # Voxel World Demo Entry Point
//!
//! Runs the library's headless demo session.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release -- [config.json]
//! ```

fn main() {
    voxel_world::run();
}
