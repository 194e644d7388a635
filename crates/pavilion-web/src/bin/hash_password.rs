//! Generates a password hash for a `[[users]]` entry in the config file.

use std::io::{self, Write};

fn main() {
    eprint!("Enter password: ");
    io::stderr().flush().unwrap();

    let mut password = String::new();
    io::stdin().read_line(&mut password).unwrap();
    let password = password.trim();

    if password.is_empty() {
        eprintln!("Password cannot be empty");
        std::process::exit(1);
    }

    let hash = pavilion_core::password::hash_password(password).expect("Failed to hash password");

    println!("{hash}");
}
