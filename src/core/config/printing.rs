use crate::core::config::data::{Config, ConfigKey};

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        for key in ConfigKey::ALL {
            match self.get(key) {
                Some(value) => println!("  {key}: {value}"),
                None => println!("  {key}: (unset)"),
            }
        }
        println!("Effective models:");
        println!("  image: {}", self.image_model());
        println!("  text: {}", self.text_model());
    }
}
