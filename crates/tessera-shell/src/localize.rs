use tessera_scope::{Contract, Scope};

/// Translates user-facing strings.
pub const LOCALIZER: Contract<dyn Localizer> = Contract::new("localization");

pub trait Localizer: Send + Sync {
    /// Translate `text`, substituting `{0}`, `{1}`, ... with `args`.
    fn t(&self, text: &str, args: &[&str]) -> String;
}

/// Returns the text unchanged apart from argument substitution.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityLocalizer;

impl Localizer for IdentityLocalizer {
    fn t(&self, text: &str, args: &[&str]) -> String {
        substitute(text, args)
    }
}

/// Replace `{n}` placeholders with `args[n]`. Placeholders without a
/// matching argument are left as they are.
pub fn substitute(text: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let replaced = tail.find('}').and_then(|end| {
            let index: usize = tail[1..end].parse().ok()?;
            Some((args.get(index)?, end))
        });
        match replaced {
            Some((arg, end)) => {
                out.push_str(arg);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Translate through the scope's localizer, or [`IdentityLocalizer`] when
/// none is registered.
pub fn localize(scope: &Scope, text: &str, args: &[&str]) -> String {
    match scope.require(&LOCALIZER) {
        Some(localizer) => localizer.t(text, args),
        None => IdentityLocalizer.t(text, args),
    }
}
