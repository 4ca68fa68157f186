/// Display version information
pub fn execute() {
    println!("chama {}", env!("CARGO_PKG_VERSION"));
    println!("Rotating savings group service");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_execute() {
        execute();
    }
}
