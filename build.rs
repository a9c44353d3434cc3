fn main() {
    println!("cargo::rustc-check-cfg=cfg(postgres_tests)");
    println!("cargo::rerun-if-env-changed=DATABASE_URL");

    // `#[sqlx::test]` cases run whenever a database is reachable.
    if std::env::var_os("DATABASE_URL").is_some() {
        println!("cargo::rustc-cfg=postgres_tests");
    }
}
