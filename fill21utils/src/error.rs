//!
//! # Fill21 Error-Helper Utilities
//!
//! Tree-walkers such as GDSII importers carry a stack of [ErrorContext]s,
//! and attach it to every failure they report.
//! [ErrorHelper] captures that pattern, and [Unwrapper] applies it post-fix:
//!
//! ```rust
//! use fill21utils::{ErrorContext, ErrorHelper, Unwrapper};
//!
//! struct Walker {
//!     stack: Vec<ErrorContext>,
//! }
//! impl ErrorHelper for Walker {
//!     type Error = String;
//!     fn err(&self, msg: impl Into<String>) -> Self::Error {
//!         format!("{} (in {:?})", msg.into(), self.stack)
//!     }
//! }
//! impl Walker {
//!     fn width(&self, w: Option<i32>) -> Result<i32, String> {
//!         let w = w.unwrapper(self, "Missing path width")?;
//!         self.assert(w >= 0, "Negative path width")?;
//!         Ok(w)
//!     }
//! }
//! let walker = Walker { stack: vec![ErrorContext::Cell("top".into())] };
//! assert_eq!(walker.width(Some(5)), Ok(5));
//! assert!(walker.width(None).unwrap_err().contains("top"));
//! ```
//!

use crate::ErrorContext;

///
/// # ErrorHelper
///
/// Implementers provide `err`, typically folding in their current [ErrorContext] stack.
/// The remaining methods are provided.
///
pub trait ErrorHelper {
    type Error;

    /// Create and return a [Self::Error] value.
    fn err(&self, msg: impl Into<String>) -> Self::Error;
    /// Return failure
    fn fail<T>(&self, msg: impl Into<String>) -> Result<T, Self::Error> {
        Err(self.err(msg))
    }
    /// Unwrap the [Option] `opt` if it is [Some], and return our error if not.
    fn unwrap<T>(&self, opt: Option<T>, msg: impl Into<String>) -> Result<T, Self::Error> {
        opt.ok_or_else(|| self.err(msg))
    }
    /// Assert a boolean condition. Returns through `self.fail` if it is not satisfied.
    fn assert(&self, b: bool, msg: impl Into<String>) -> Result<(), Self::Error> {
        if b {
            Ok(())
        } else {
            self.fail(msg)
        }
    }
}

///
/// # Context Stack
///
/// Push/pop bookkeeping shared by [ErrorHelper] implementers which track [ErrorContext]s.
///
pub trait ContextStack {
    /// Mutable access to the implementer's context stack
    fn stack(&mut self) -> &mut Vec<ErrorContext>;
    /// Run `f` with `ctx` pushed, popping it again on success.
    /// On failure the stack is left in place, so errors created further up still report it.
    fn within<T, E>(
        &mut self,
        ctx: ErrorContext,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        Self: Sized,
    {
        self.stack().push(ctx);
        let rv = f(self)?;
        self.stack().pop();
        Ok(rv)
    }
}

///
/// # Unwrapper
///
/// Post-fix [ErrorHelper] handling for [Option]s and [Result]s.
/// Import the trait and call `unwrapper` in place of `unwrap`.
///
pub trait Unwrapper {
    type Ok;
    fn unwrapper<H>(self, helper: &H, msg: impl Into<String>) -> Result<Self::Ok, H::Error>
    where
        H: ErrorHelper;
}
impl<T> Unwrapper for Option<T> {
    type Ok = T;
    fn unwrapper<H>(self, helper: &H, msg: impl Into<String>) -> Result<Self::Ok, H::Error>
    where
        H: ErrorHelper,
    {
        helper.unwrap(self, msg)
    }
}
impl<T, E> Unwrapper for Result<T, E> {
    type Ok = T;
    fn unwrapper<H>(
        self,
        helper: &H,
        msg: impl Into<String>,
    ) -> Result<<Self as Unwrapper>::Ok, H::Error>
    where
        H: ErrorHelper,
    {
        helper.unwrap(self.ok(), msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Walker {
        stack: Vec<ErrorContext>,
    }
    impl ErrorHelper for Walker {
        type Error = (String, Vec<ErrorContext>);
        fn err(&self, msg: impl Into<String>) -> Self::Error {
            (msg.into(), self.stack.clone())
        }
    }
    impl ContextStack for Walker {
        fn stack(&mut self) -> &mut Vec<ErrorContext> {
            &mut self.stack
        }
    }

    #[test]
    fn within_pops_on_success() {
        let mut w = Walker::default();
        let rv: Result<i32, (String, Vec<ErrorContext>)> =
            w.within(ErrorContext::Units, |_| Ok(3));
        assert_eq!(rv.ok(), Some(3));
        assert!(w.stack.is_empty());
    }

    #[test]
    fn within_keeps_context_on_failure() {
        let mut w = Walker::default();
        let rv: Result<(), _> = w.within(ErrorContext::Cell("a".into()), |w| {
            w.within(ErrorContext::Geometry, |w| w.fail("bad polygon"))
        });
        let (msg, stack) = rv.unwrap_err();
        assert_eq!(msg, "bad polygon");
        assert_eq!(
            stack,
            vec![ErrorContext::Cell("a".into()), ErrorContext::Geometry]
        );
    }

    #[test]
    fn unwrapper_on_results() {
        let w = Walker::default();
        let r: Result<u8, ()> = Err(());
        assert_eq!(r.unwrapper(&w, "nope").unwrap_err().0, "nope");
        let r: Result<u8, ()> = Ok(1);
        assert_eq!(r.unwrapper(&w, "nope").ok(), Some(1));
    }
}
