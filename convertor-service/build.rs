fn main() {
    // Nothing is linked at build time. External engines are resolved at runtime:
    // - libpdfium from the configured directory, ./, vendor/pdfium/lib/ or the system
    // - soffice, tesseract and Chromium from configured paths or PATH
    println!("cargo:rerun-if-changed=build.rs");
}
