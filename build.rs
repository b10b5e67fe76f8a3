fn main() {
    // macOS: CoreBluetooth refuses to scan from a binary without an embedded
    // Info.plist carrying NSBluetoothAlwaysUsageDescription.  Link it into the
    // __TEXT,__info_plist section so a plain CLI binary is treated like a bundle.
    //
    // CARGO_CFG_TARGET_OS is the target, not the host, so cross builds work.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }
    let Ok(dir) = std::env::var("CARGO_MANIFEST_DIR") else {
        return;
    };
    let plist = format!("{dir}/Info.plist");

    for arg in ["-sectcreate", "__TEXT", "__info_plist", plist.as_str()] {
        println!("cargo:rustc-link-arg={arg}");
    }
    println!("cargo:rerun-if-changed=Info.plist");
}
