//! # System Interaction Layer
//!
//! The default, filesystem- and process-backed collaborators of the bootstrap.
//!
//! ## Modules
//!
//! - **`executor`**: spawns external commands (`shlex` splitting, `dunce` paths,
//!   Windows `cmd /C` fallback) with inherited or captured output.
//! - **`resolver`**: resolves module coordinates against local repository layouts.
//! - **`compiler`**: compiles build-definition sources through an external command,
//!   skipping unchanged inputs.
//! - **`workspace`**: empties the work and output areas.
//! - **`environment`**: reads the environment-origin settings layer.

pub mod compiler;
pub mod environment;
pub mod executor;
pub mod resolver;
pub mod workspace;
