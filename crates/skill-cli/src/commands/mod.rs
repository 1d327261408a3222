//! Command handlers backing the `skill` binary's subcommands. Each handler
//! takes the wired [`crate::app::App`] and returns the process exit code
//! (§6): `0` success, `2` not found, `3` invalid args, `4` timeout, `5`
//! subprocess failure, `1` everything else.

pub mod dispatch;
pub mod index;
pub mod route;
pub mod skill;

/// Map a [`skill_kernel::KernelError::kind`] string onto the exit code
/// contract. Unknown kinds (there shouldn't be any) fall back to `1`.
pub fn exit_code_for_kind(kind: &str) -> i32 {
    match kind {
        "NotFound" | "CommandNotFound" => 2,
        "InvalidArgs" => 3,
        "Timeout" => 4,
        "SubprocessFailure" => 5,
        _ => 1,
    }
}
