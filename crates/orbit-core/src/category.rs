use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Category {
  pub id:    String,
  pub name:  String,
  pub icon:  String,
  pub color: String
}

impl Category {
  pub fn new(
    id: &str,
    name: &str,
    icon: &str,
    color: &str
  ) -> Self {
    Self {
      id:    id.to_string(),
      name:  name.to_string(),
      icon:  icon.to_string(),
      color: color.to_string()
    }
  }
}

/// Fixed, ordered category set.
///
/// Built once at startup and never mutated; lookups of ids that are not
/// registered resolve to a fallback entry so orphaned task categories
/// still render.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
  categories: Vec<Category>,
  fallback:   Category
}

impl Default for CategoryRegistry {
  fn default() -> Self {
    Self::new(vec![
      Category::new(
        "personal",
        "Personal",
        "🪐",
        "bg-purple-500"
      ),
      Category::new(
        "work",
        "Work",
        "🌎",
        "bg-blue-500"
      ),
      Category::new(
        "health",
        "Health",
        "✨",
        "bg-green-500"
      ),
      Category::new(
        "learning",
        "Learning",
        "🚀",
        "bg-yellow-500"
      ),
    ])
  }
}

impl CategoryRegistry {
  pub fn new(
    categories: Vec<Category>
  ) -> Self {
    let mut seen =
      std::collections::HashSet::new();
    let categories = categories
      .into_iter()
      .filter(|cat| {
        seen.insert(cat.id.clone())
      })
      .collect();

    Self {
      categories,
      fallback: Category::new(
        "",
        "Uncategorized",
        "🔍",
        "bg-gray-500"
      )
    }
  }

  pub fn list(&self) -> &[Category] {
    &self.categories
  }

  pub fn contains(
    &self,
    id: &str
  ) -> bool {
    self
      .categories
      .iter()
      .any(|cat| cat.id == id)
  }

  pub fn lookup(
    &self,
    id: &str
  ) -> &Category {
    self
      .categories
      .iter()
      .find(|cat| cat.id == id)
      .unwrap_or(&self.fallback)
  }

  pub fn fallback(&self) -> &Category {
    &self.fallback
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_registry_keeps_fixed_order()
  {
    let registry =
      CategoryRegistry::default();
    let ids: Vec<&str> = registry
      .list()
      .iter()
      .map(|cat| cat.id.as_str())
      .collect();
    assert_eq!(
      ids,
      vec![
        "personal", "work", "health",
        "learning"
      ]
    );
  }

  #[test]
  fn unknown_ids_resolve_to_fallback() {
    let registry =
      CategoryRegistry::default();
    assert_eq!(
      registry.lookup("work").name,
      "Work"
    );

    let orphan =
      registry.lookup("groceries");
    assert_eq!(orphan.icon, "🔍");
    assert_eq!(orphan.color, "bg-gray-500");
    assert!(!registry.contains("groceries"));
  }

  #[test]
  fn duplicate_ids_keep_first_entry() {
    let registry =
      CategoryRegistry::new(vec![
        Category::new("a", "A", "*", "x"),
        Category::new("a", "B", "*", "y"),
      ]);
    assert_eq!(registry.list().len(), 1);
    assert_eq!(
      registry.lookup("a").name,
      "A"
    );
  }
}
