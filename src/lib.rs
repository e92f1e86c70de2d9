// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotresolve
//!
//! Detection and recovery of obfuscator-generated resource resolvers in .NET modules.
//!
//! Protectors such as .NET Reactor and SmartAssembly move a module's resources out of
//! sight and install a resolver: a generated type whose static handler answers the
//! runtime's resolve requests by decrypting and decompressing a hidden payload. `dotresolve`
//! recognizes those types by their structure alone, locates the method that sets them up,
//! and hands back the plain resource so it can be merged into the module again.
//!
//! ## Features
//!
//! - **🔍 Structural detection** - Field shapes, handler signatures and filler-tolerant
//!   instruction patterns, no reliance on (obfuscated) names
//! - **🔓 Resource recovery** - AES-CBC decryption, QuickLZ and Deflate decompression
//! - **🧩 Pluggable collaborators** - Bring your own method normalizer, string decrypter
//!   and decrypter heuristic
//! - **⚡ Parallel** - Analyze many modules at once with `rayon`
//! - **📜 Event log** - Every stage records what it did
//!
//! ## Quick Start
//!
//! ```rust
//! use dotresolve::prelude::*;
//!
//! let mut module = Module::new("protected.dll");
//! // ... populated by a binary reader ...
//!
//! let engine = ResolverEngine::default();
//! let outcome = engine.process(&mut module)?;
//! if let Some(resource) = outcome.resource() {
//!     println!("recovered '{}' ({} bytes)", resource.name, resource.size());
//! }
//! println!("{}", outcome.events().summary());
//! # Ok::<(), dotresolve::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The structured module model the detectors read and rewrite
//! - [`assembly`] - Decoded instructions and filler-tolerant pattern matching
//! - [`deobfuscation`] - Detectors, initializer location, recovery and the engine
//! - [`utils`] - Decryption and decompression primitives
//!
//! ## Error Handling
//!
//! A module without a resolver is not an error. A detected resolver that cannot be
//! recovered is reported through [`Error`], naming the module and what was missing.

#[macro_use]
pub(crate) mod error;


/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotresolve::prelude::*;
///
/// let engine = ResolverEngine::new(ResolverConfig::detection_only());
/// let mut module = Module::new("app.exe");
/// assert!(!engine.process(&mut module)?.detected());
/// # Ok::<(), dotresolve::Error>(())
/// ```
pub mod prelude;

/// Decoded CIL instructions and opcode pattern matching.
///
/// # Key Types
///
/// - [`assembly::Instruction`] - A decoded instruction with a structural operand
/// - [`assembly::OpCode`] - Operation codes the detectors reason about
/// - [`assembly::PatternScanner`] - Sliding-window matcher skipping filler opcodes
///
/// # Examples
///
/// ```rust
/// use dotresolve::assembly::{find_sequence, Instruction, OpCode};
///
/// let code = vec![
///     Instruction::ldstr("X"),
///     Instruction::simple(OpCode::Nop),
///     Instruction::simple(OpCode::Ret),
/// ];
/// let found = find_sequence(&code, 0, &[OpCode::Ldstr, OpCode::Ret]).unwrap();
/// assert_eq!(found.len(), 2);
/// ```
pub mod assembly;

/// The structured module model: types, fields, methods, bodies and resources.
///
/// # Key Components
///
/// - [`metadata::module::Module`] - Owns declarations, the method table and resources
/// - [`metadata::typesystem`] - Type and field declarations, structural type references
/// - [`metadata::method`] - Method declarations, bodies, signatures and references
/// - [`metadata::token`] - Metadata tokens used as stable identities
/// - [`metadata::identity`] - Assembly display-name handling
pub mod metadata;

/// Resource resolver detection and recovery.
///
/// See [`deobfuscation::ResolverEngine`] for the entry point.
pub mod deobfuscation;

/// Decryption and decompression primitives.
pub mod utils;

/// `dotresolve` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `dotresolve` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust
/// use dotresolve::{deobfuscation::ResolverEngine, metadata::module::Module, Error};
///
/// let mut module = Module::new("app.exe");
/// match ResolverEngine::default().process(&mut module) {
///     Ok(outcome) => assert!(!outcome.detected()),
///     Err(Error::ResolverInitMissing { type_name, .. }) => println!("unsupported: {type_name}"),
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;
