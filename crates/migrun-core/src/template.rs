/// Skeleton for a freshly created migration file.
pub fn render(name: &str, description: &str) -> String {
    format!(
        "-- Skip: no\n\
         -- Name: {name}\n\
         -- Description: {description}\n\
         \n\
         -- UP --\n\
         \n\
         \n\
         -- DOWN --\n\
         \n"
    )
}
