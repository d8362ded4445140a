pub use enclose::*;

/// Synchronous condition from a closure body, optionally cloning captures
/// first the way `enclose!` does.
///
/// The condition takes no context (`C = ()`). Rules with a context use
/// [`Condition::check`](crate::Condition::check) directly.
///
/// ```ignore
/// let allowed = vec!["M", "F"];
/// let gender = check!((allowed) input => if allowed.contains(input) { Ok(()) } else { Err("pick one".into()) });
/// ```
#[macro_export]
macro_rules! check {
    (( $($d_tt:tt)* ) $input:ident => $($b:tt)*) => {
        $crate::Condition::check($crate::macros::enclose!(($( $d_tt )*) move |_: &(), $input: &_| { $($b)* }))
    };
    ($input:ident => $($b:tt)*) => {
        $crate::Condition::check(move |_: &(), $input: &_| { $($b)* })
    };
}
