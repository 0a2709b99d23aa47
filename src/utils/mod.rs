pub mod mime;
#[cfg(test)]
pub mod test_utils;
