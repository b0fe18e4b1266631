/// A console subcommand. Each command builds its own runtime when it needs one.
pub trait CallableTrait {
    fn call(&self) -> Result<(), Box<dyn std::error::Error>>;
}
