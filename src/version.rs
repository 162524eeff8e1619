pub fn print_version_info() {
    println!("voxskin {}", ::VERSION);

    // Optionally set by whoever packages the build
    if let Some(info) = option_env!("VOXSKIN_BUILD_COMMIT_HASH") {
        println!("build commit: {}", info);
    }
    if let Some(info) = option_env!("VOXSKIN_BUILD_COMMIT_DATE") {
        println!("build commit date: {}", info);
    }
}
