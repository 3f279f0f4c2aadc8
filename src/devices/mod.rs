//! Device modules built on the substrate.
//!
//! | Module  | Record slot   | Bus categories   | Behavior          |
//! |---------|---------------|------------------|-------------------|
//! | `gate`  | `Gate(0..4)`  | Binary           | UDSM + profile    |
//! | `light` | `Light(0..8)` | Binary, Dimmer   | on/off, level     |

pub mod gate;
pub mod light;
