// build.rs
//
// Generates the `t!` macro from the message tables under `locales/`.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

const FALLBACK_LANG: &str = "en";

fn main() {
    // --- 1. Pick the language: `lang_*` features first, then KEEL_LANG, then English ---
    let mut features: Vec<String> = env::vars()
        .filter_map(|(key, _)| {
            key.strip_prefix("CARGO_FEATURE_LANG_")
                .map(str::to_lowercase)
        })
        .collect();
    features.sort();

    let lang = match features.first() {
        Some(first) => {
            if features.len() > 1 {
                println!(
                    "cargo:warning=Multiple language features enabled ({:?}). Using '{}'.",
                    features, first
                );
            }
            first.clone()
        }
        None => env::var("KEEL_LANG").unwrap_or_else(|_| FALLBACK_LANG.to_string()),
    };

    println!("cargo:rustc-env=KEEL_LANG_EFFECTIVE={}", lang);
    println!("cargo:rerun-if-env-changed=KEEL_LANG");
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=locales/");

    // --- 2. Load the English table, then overlay the selected language ---
    let mut messages = read_table(&format!("locales/{}.toml", FALLBACK_LANG))
        .expect("Failed to read fallback message table: locales/en.toml");

    if lang != FALLBACK_LANG {
        let path = format!("locales/{}.toml", lang);
        match read_table(&path) {
            Some(overlay) => {
                for key in overlay.keys() {
                    if !messages.contains_key(key) {
                        println!(
                            "cargo:warning=Key '{}' in '{}' has no English counterpart.",
                            key, path
                        );
                    }
                }
                messages.extend(overlay);
            }
            None => println!(
                "cargo:warning=Message table '{}' not found. Falling back to 'en'.",
                path
            ),
        }
    }

    // --- 3. Emit one macro arm per key, sorted so the output is reproducible ---
    let mut code = String::from("#[macro_export]\nmacro_rules! t {\n");
    for (key, value) in &messages {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        code.push_str(&format!("    (\"{}\") => {{ \"{}\" }};\n", key, escaped));
    }
    // Unknown keys fail at compile time.
    code.push_str(
        "    ($key:expr) => {{ compile_error!(concat!(\"Missing translation key: \", $key)) }};\n",
    );
    code.push('}');

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is always set by cargo");
    fs::write(Path::new(&out_dir).join("translations.rs"), code)
        .expect("Failed to write generated translations");
}

fn read_table(path: &str) -> Option<BTreeMap<String, String>> {
    let content = fs::read_to_string(path).ok()?;
    let table = toml::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", path, e));
    Some(table)
}
