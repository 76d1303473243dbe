fn main() {
    // Host builds (unit tests) have no ESP-IDF environment to forward.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    if std::env::var("CARGO_FEATURE_EDGE_IMPULSE").is_ok() {
        let prefix = toolchain_prefix();
        let compiler = find_compiler(prefix).unwrap_or_else(|| format!("{prefix}-g++").into());
        build_ei(&compiler);
    }
}

/// GCC triple prefix for the chip selected by the Rust target.
fn toolchain_prefix() -> &'static str {
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.starts_with("xtensa-esp32s3") {
        "xtensa-esp32s3-elf"
    } else if target.starts_with("xtensa-esp32") {
        "xtensa-esp32-elf"
    } else {
        "riscv32-esp-elf"
    }
}

fn find_compiler(prefix: &str) -> Option<std::path::PathBuf> {
    use std::path::PathBuf;
    // Check local .embuild first, then global ~/.espressif
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok()?;
    let search_dirs = vec![
        PathBuf::from(manifest_dir).join(".embuild"),
        dirs::home_dir().map(|h| h.join(".espressif")).unwrap_or_default(),
    ];

    for root in search_dirs {
        let tools_dir = root.join("espressif/tools").join(prefix);
        // Versioned directory, e.g. esp-13.2.0_20240530
        let Ok(entries) = std::fs::read_dir(&tools_dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let candidate = entry
                .path()
                .join(prefix)
                .join("bin")
                .join(format!("{prefix}-g++"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

fn build_ei(compiler_path: &std::path::Path) {
    use std::path::PathBuf;

    let sdk_root = PathBuf::from("egg-counter_inferencing");

    let mut build = cc::Build::new();

    build
        .cpp(true)
        .compiler(compiler_path)
        .flag("-std=c++14")
        .flag("-O3")
        .flag("-g3")
        .define("EI_CLASSIFIER_ENABLE_DETECTION_3D", "0")
        .define("EI_CLASSIFIER_TFLITE_ENABLE_CMSIS_NN", "0")
        .define("EI_NATIVE_ARCH", "1")
        .include(&sdk_root)
        .include(sdk_root.join("src"))
        .include(sdk_root.join("src/edge-impulse-sdk"))
        .include(sdk_root.join("src/model-parameters"))
        .include(sdk_root.join("src/tflite-model"));

    add_source_files(&mut build, &sdk_root.join("src"));

    // Rust-facing entry points (context-pointer signal, flat box array).
    build.file("csrc/egg_detector.cpp");

    build.compile("edge-impulse-sdk");

    println!("cargo:rerun-if-changed=egg-counter_inferencing");
    println!("cargo:rerun-if-changed=csrc/egg_detector.cpp");
}

fn add_source_files(build: &mut cc::Build, dir: &std::path::Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        println!("cargo:warning=cannot read {}", dir.display());
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            add_source_files(build, &path);
        } else if let Some(ext) = path.extension() {
            if ext == "c" || ext == "cpp" || ext == "cc" {
                build.file(&path);
            }
        }
    }
}
