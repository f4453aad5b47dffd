fn main() {
    // option_env!() values are cached between builds otherwise.
    println!("cargo:rerun-if-env-changed=ERP_API_URL");
}
