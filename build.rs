fn main() {
    // Device builds need the ESP-IDF build environment wired through;
    // host builds (tests) skip it.
    if std::env::var("CARGO_FEATURE_ESPIDF").is_ok() {
        embuild::espidf::sysenv::output();
    }
}
