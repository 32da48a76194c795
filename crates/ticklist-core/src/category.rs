use serde::{Deserialize, Serialize};

/// A display grouping for tasks. Tasks refer to a category by `name`, not by
/// `id`, and nothing enforces that the name exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
}

impl Category {
    fn seeded(id: &str, name: &str, color: &str, icon: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
        }
    }
}

pub fn default_categories() -> Vec<Category> {
    vec![
        Category::seeded("1", "Work", "#3B82F6", "briefcase"),
        Category::seeded("2", "Personal", "#10B981", "user"),
        Category::seeded("3", "Shopping", "#F59E0B", "shopping-cart"),
        Category::seeded("4", "Health", "#EF4444", "heart"),
        Category::seeded("5", "Learning", "#8B5CF6", "book"),
    ]
}

#[cfg(test)]
mod tests {
    use super::default_categories;

    #[test]
    fn five_seeded_categories_with_unique_names() {
        let categories = default_categories();
        assert_eq!(categories.len(), 5);

        let mut names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
        assert!(categories.iter().all(|c| c.color.starts_with('#')));
    }
}
