//! Architecture-specific context switch shims.
//!
//! One module per supported architecture, selected by `cfg(target_arch)`,
//! exactly as the teacher splits `src/arch/aarch64` from its (implicit)
//! x86-64 root module. Each backend exports a `TaskContext` and the pair of
//! `init_stack`/`switch_context` functions the rest of the crate treats as
//! opaque.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
pub(crate) use self::x86_64::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub(crate) use self::aarch64::*;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("mnrt only implements context switching for x86_64 and aarch64");
