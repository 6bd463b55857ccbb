fn main() {
    println!("cargo:rerun-if-changed=csrc/assert_msg.c");
    println!("cargo:rerun-if-changed=include/mcmock.h");

    cc::Build::new()
        .file("csrc/assert_msg.c")
        .include("include")
        .warnings(true)
        .compile("mcmock_assert_msg");
}
