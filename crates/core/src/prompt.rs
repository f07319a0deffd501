//! System prompt and greeting rendering.
//!
//! The default prompt is a template with three placeholders:
//! `{{restaurant_name}}`, `{{cuisine_clause}}` and `{{menu}}`.

use crate::menu::{MenuItem, Restaurant};

/// Builds the realtime session instructions for a restaurant.
///
/// A restaurant-specific `system_prompt` replaces the template entirely.
pub fn render_system_prompt(template: &str, restaurant: &Restaurant, menu: &[MenuItem]) -> String {
    if let Some(custom) = restaurant
        .system_prompt
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    {
        return custom.to_string();
    }

    let cuisine_clause = restaurant
        .cuisine
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!(", a {} restaurant", c))
        .unwrap_or_default();
    let menu_text = menu
        .iter()
        .map(MenuItem::prompt_line)
        .collect::<Vec<_>>()
        .join("\n");

    template
        .replace("{{restaurant_name}}", &restaurant.name)
        .replace("{{cuisine_clause}}", &cuisine_clause)
        .replace("{{menu}}", &menu_text)
}

/// Instructions for the one-off response that opens the call.
pub fn greeting_instructions(restaurant: &Restaurant) -> String {
    format!(
        "Say exactly this greeting to the caller: \"{}\"",
        restaurant.greeting()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "You are a phone assistant for {{restaurant_name}}{{cuisine_clause}}.\n\nMENU:\n{{menu}}";

    #[test]
    fn test_template_is_filled_from_catalog() {
        let mut restaurant = Restaurant::new("Luigi's");
        restaurant.cuisine = Some("Italian".to_string());
        let menu = vec![
            MenuItem::new(restaurant.id, "Margherita Pizza", 12.0),
            MenuItem::new(restaurant.id, "Tiramisu", 7.5),
        ];

        let prompt = render_system_prompt(TEMPLATE, &restaurant, &menu);
        assert_eq!(
            prompt,
            "You are a phone assistant for Luigi's, a Italian restaurant.\n\nMENU:\n- Margherita Pizza ($12): No description\n- Tiramisu ($7.5): No description"
        );
    }

    #[test]
    fn test_missing_cuisine_leaves_no_clause() {
        let restaurant = Restaurant::new("Luigi's");
        let prompt = render_system_prompt(TEMPLATE, &restaurant, &[]);
        assert!(prompt.starts_with("You are a phone assistant for Luigi's.\n"));
        assert!(prompt.ends_with("MENU:\n"));
    }

    #[test]
    fn test_custom_prompt_wins() {
        let mut restaurant = Restaurant::new("Luigi's");
        restaurant.system_prompt = Some("Only speak Italian.".to_string());
        assert_eq!(
            render_system_prompt(TEMPLATE, &restaurant, &[]),
            "Only speak Italian."
        );
    }

    #[test]
    fn test_greeting_instructions_quote_the_greeting() {
        let restaurant = Restaurant::new("Luigi's");
        assert_eq!(
            greeting_instructions(&restaurant),
            "Say exactly this greeting to the caller: \"Welcome to Luigi's! How can I help you today?\""
        );
    }
}
