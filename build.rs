use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");

    // Only bare-metal Thumb builds need the linker script; host builds and
    // tests link normally.
    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("thumb") {
        return;
    }

    // Copy memory.x into OUT_DIR so the linker can find it
    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        println!("cargo:warning=OUT_DIR not set; skipping memory.x");
        return;
    };
    if let Err(err) = fs::copy("memory.x", out_dir.join("memory.x")) {
        println!("cargo:warning=cannot copy memory.x: {}", err);
        return;
    }
    println!("cargo:rustc-link-search={}", out_dir.display());
}
