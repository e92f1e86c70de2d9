use thiserror::Error;

use crate::utils::decompress::DecompressError;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Failing to find a resolver is not an error: detectors report a no-match as `None` and the
/// driver moves on. The variants below cover the conditions that must reach the caller.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - The module model is internally inconsistent (dangling token, ...)
/// - [`Error::ResolverInitMissing`] - A resolver was detected, but a companion it requires is absent
///
/// ## Recovery Errors
/// - [`Error::Decryption`] - Key material is missing or the ciphertext was rejected
/// - [`Error::Decompression`] - The decrypted payload could not be decompressed
/// - [`Error::Collaborator`] - A normalizer or string decrypter reported a failure
///
/// # Examples
///
/// ```rust,no_run
/// use dotresolve::{Error, deobfuscation::ResolverEngine, metadata::module::Module};
///
/// let engine = ResolverEngine::default();
/// let mut module = Module::new("protected.dll");
///
/// match engine.process(&mut module) {
///     Ok(outcome) => println!("resolver detected: {}", outcome.detected()),
///     Err(Error::ResolverInitMissing { type_name, missing, .. }) => {
///         eprintln!("unsupported build: {type_name} has no {missing}");
///     }
///     Err(e) => eprintln!("recovery failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The module model is damaged and could not be analyzed.
    ///
    /// Raised through `malformed_error!`, which records the source location where the
    /// inconsistency was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A resolver handler was detected, but a structural companion it depends on is missing.
    ///
    /// This indicates that detection matched a construct that only looks like a resolver
    /// (or an unsupported sub-variant). Recovery for the module is aborted; the caller
    /// decides whether to skip the module or stop the run.
    #[error("Could not find resource resolver {missing} on type '{type_name}' in module '{module}'")]
    ResolverInitMissing {
        /// Name of the module being analyzed
        module: String,
        /// Full name of the detected resolver type
        type_name: String,
        /// The structural piece that could not be located
        missing: &'static str,
    },

    /// Resource decryption failed.
    ///
    /// Covers missing or badly sized key material as well as ciphertext rejected by the
    /// block cipher (bad padding, truncated blocks).
    #[error("Resource decryption failed - {0}")]
    Decryption(String),

    /// Decompression of a decrypted payload failed.
    #[error("{0}")]
    Decompression(#[from] DecompressError),

    /// An external collaborator (normalizer, string decrypter) reported a failure.
    ///
    /// The message is passed through unchanged; recovery is deterministic, so no retry
    /// is attempted.
    #[error("{0}")]
    Collaborator(String),
}
