//! Caller-declared identity assertions (`assert`, `assertuser`).

use apigate_kernel::gateway::{ApiFailure, ApiMessage, CallerIdentity, FailureKind};
use tracing::warn;

/// Right that satisfies `assert=bot`.
pub const BOT_RIGHT: &str = "bot";

/// Value of the `assert` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertKind {
    User,
    Bot,
    Anon,
}

impl AssertKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(AssertKind::User),
            "bot" => Some(AssertKind::Bot),
            "anon" => Some(AssertKind::Anon),
            _ => None,
        }
    }
}

/// Check `assert` and `assertuser` against the executing identity.
///
/// Unknown `assert` values are a `badvalue` failure. The named-user check
/// runs after the kind check and independently of it.
pub fn check_assertions(
    assert: Option<&str>,
    assert_user: Option<&str>,
    caller: &CallerIdentity,
) -> Result<(), ApiFailure> {
    if let Some(value) = assert {
        let kind = AssertKind::parse(value).ok_or_else(|| {
            ApiFailure::usage(
                FailureKind::BadValue,
                ApiMessage::new(
                    FailureKind::BadValue.code(),
                    "apierror-unrecognizedvalue",
                    ["assert", value],
                ),
            )
        })?;
        check_kind(kind, caller)?;
    }

    if let Some(expected) = assert_user {
        let matches = caller
            .name()
            .is_some_and(|name| normalize_user_name(name) == normalize_user_name(expected));
        if !matches {
            warn!(asserted = %expected, "assertuser failed");
            return Err(failure(
                FailureKind::AssertNamedUserFailed,
                "apierror-assertnameduserfailed",
                Some(expected),
            ));
        }
    }
    Ok(())
}

fn check_kind(kind: AssertKind, caller: &CallerIdentity) -> Result<(), ApiFailure> {
    let failed = match kind {
        AssertKind::User if caller.is_anonymous() => Some((
            FailureKind::AssertUserFailed,
            "apierror-assertuserfailed",
        )),
        AssertKind::Anon if !caller.is_anonymous() => Some((
            FailureKind::AssertAnonFailed,
            "apierror-assertanonfailed",
        )),
        AssertKind::Bot if !caller.has_right(BOT_RIGHT) => Some((
            FailureKind::AssertBotFailed,
            "apierror-assertbotfailed",
        )),
        _ => None,
    };
    match failed {
        Some((kind, key)) => {
            warn!(assertion = kind.error_type(), "assertion failed");
            Err(failure(kind, key, None))
        }
        None => Ok(()),
    }
}

fn failure(kind: FailureKind, key: &str, param: Option<&str>) -> ApiFailure {
    ApiFailure::usage(kind, ApiMessage::new(kind.code(), key, param))
}

/// User names compare with underscores as spaces and the first letter
/// upper-cased.
fn normalize_user_name(name: &str) -> String {
    let name = name.replace('_', " ");
    let name = name.trim();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
