//! Public name minting and collision disambiguation

/// Upper bound on `name(n).ext` candidates tried before giving up
pub const MAX_DISAMBIGUATION_ATTEMPTS: u32 = 10_000;

const FALLBACK_NAME: &str = "file";

/// Reduce an uploader-supplied name to a single safe path component
pub fn sanitize_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    match cleaned {
        "" | "." | ".." => FALLBACK_NAME.to_string(),
        other => other.to_string(),
    }
}

/// True if `name` could have been produced by `sanitize_name`
pub(crate) fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.chars().any(|c| c.is_control())
}

/// Split `report.pdf` into (`report`, `.pdf`). A leading dot is not an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Produces candidate public names. Whether a candidate is free is decided
/// by the store, which checks both the blob directory and the index.
#[derive(Debug, Clone)]
pub struct NameResolver {
    max_attempts: u32,
}

impl NameResolver {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The preferred name before disambiguation. A desired name without an
    /// extension borrows the original file's extension.
    pub fn base_name(&self, desired: Option<&str>, original: &str) -> String {
        let original = sanitize_name(original);

        match desired.map(str::trim).filter(|d| !d.is_empty()) {
            Some(desired) => {
                let desired = sanitize_name(desired);
                if split_extension(&desired).1.is_empty() {
                    format!("{}{}", desired, split_extension(&original).1)
                } else {
                    desired
                }
            }
            None => original,
        }
    }

    /// `base`, then `stem(1).ext`, `stem(2).ext`, ... up to the attempt cap
    pub fn candidates<'a>(&self, base: &'a str) -> impl Iterator<Item = String> + 'a {
        let (stem, ext) = split_extension(base);
        std::iter::once(base.to_string())
            .chain((1..self.max_attempts).map(move |n| format!("{}({}){}", stem, n, ext)))
    }
}

impl Default for NameResolver {
    fn default() -> Self {
        Self::new(MAX_DISAMBIGUATION_ATTEMPTS)
    }
}
