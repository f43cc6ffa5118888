use once_cell::sync::Lazy;
use regex::Regex;

/// One trailing version, architecture, platform or release-stage token,
/// together with the separator in front of it.
static TRAILING_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        [-_.\ ]+
        (?:
            v?[0-9]+(?:\.[0-9]+)*[a-z]?
          | x86[-_]64 | amd64 | x64 | i[3-6]86 | x86 | aarch64 | arm64 | armv[67]l? | armhf | arm
          | linux | gnu | musl | unknown | win(?:32|64)? | windows | macos | darwin | osx | mac
          | universal | portable | appimage | static
          | alpha[0-9]* | beta[0-9]* | rc[0-9]* | nightly | stable | release | preview | dev
        )$",
    )
    .unwrap()
});

fn compact(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '_' | '.' | ' '))
        .collect()
}

/// Names an application binary is likely to carry, derived from an archive
/// or package base name. Longest first, no duplicates.
///
/// `"Foo-Bar-2.1-linux-x86_64"` yields `foo-bar-2.1-linux-x86_64`, then
/// `foo-bar-2.1-linux`, `foo-bar-2.1`, `foo-bar`, plus compact forms such as
/// `foobar`.
pub fn name_variants(base_name: &str) -> Vec<String> {
    let mut current = base_name.trim().to_lowercase();
    let mut stripped = vec![current.clone()];
    while let Some(found) = TRAILING_TOKEN.find(&current) {
        if found.start() == 0 {
            break;
        }
        current.truncate(found.start());
        stripped.push(current.clone());
    }

    let mut variants: Vec<String> = Vec::with_capacity(stripped.len() * 2);
    for name in stripped {
        let compacted = compact(&name);
        for candidate in [name, compacted] {
            if !candidate.is_empty() && !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }
    }
    variants.sort_by_key(|v| std::cmp::Reverse(v.len()));
    variants
}
