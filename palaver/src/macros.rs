/// Creates a single [`WireMessage`](crate::WireMessage) from a role shorthand.
///
/// ```rust
/// use palaver::{WireRole, pv_msg};
///
/// let message = pv_msg!(assistant => "Done.");
/// assert_eq!(message.role, WireRole::Assistant);
/// ```
#[macro_export]
macro_rules! pv_msg {
    (system => $content:expr $(,)?) => {
        $crate::WireMessage::text($crate::WireRole::System, $content)
    };
    (user => $content:expr $(,)?) => {
        $crate::WireMessage::text($crate::WireRole::User, $content)
    };
    (assistant => $content:expr $(,)?) => {
        $crate::WireMessage::text($crate::WireRole::Assistant, $content)
    };
    ($role:ident => $content:expr $(,)?) => {
        compile_error!("unsupported role: use system, user, or assistant");
    };
}

/// Creates a `Vec<WireMessage>` from role/content pairs.
///
/// ```rust
/// use palaver::{WireRole, pv_messages};
///
/// let messages = pv_messages![
///     system => "You are concise.",
///     user => "Summarize this repository.",
/// ];
///
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[0].role, WireRole::System);
/// assert_eq!(messages[1].role, WireRole::User);
/// ```
#[macro_export]
macro_rules! pv_messages {
    () => {
        Vec::<$crate::WireMessage>::new()
    };
    ($($role:ident => $content:expr),+ $(,)?) => {
        vec![$($crate::pv_msg!($role => $content)),+]
    };
}
