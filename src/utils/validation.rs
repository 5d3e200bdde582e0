use crate::models::{Interaction, UserPreferences};
use anyhow::{anyhow, Result};

pub const MAX_LIMIT: usize = 1000;

pub fn validate_interaction(interaction: &Interaction) -> Result<()> {
    let max_future = chrono::Utc::now() + chrono::Duration::hours(1);
    if interaction.timestamp > max_future {
        return Err(anyhow!("Timestamp cannot be more than 1 hour in the future"));
    }

    Ok(())
}

pub fn validate_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(anyhow!("Limit must be greater than 0"));
    }

    if limit > MAX_LIMIT {
        return Err(anyhow!("Limit too large (max {})", MAX_LIMIT));
    }

    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(anyhow!("Invalid email address: {}", email));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') || email.contains(char::is_whitespace) {
        return Err(anyhow!("Invalid email address: {}", email));
    }

    Ok(())
}

pub fn validate_preferences(preferences: &UserPreferences) -> Result<()> {
    let range = &preferences.price_range;
    if !range.min.is_finite() || range.min < 0.0 {
        return Err(anyhow!("Minimum price must be a non-negative number"));
    }

    if let Some(max) = range.max {
        if !max.is_finite() || max < range.min {
            return Err(anyhow!("Maximum price must be at least the minimum price"));
        }
    }

    if preferences.categories.iter().any(|c| c.trim().is_empty()) {
        return Err(anyhow!("Category names cannot be empty"));
    }

    Ok(())
}

/// Parses a stored embedding, rejecting wrong dimensions and NaN/Infinity.
pub fn decode_embedding(text: &str, dimension: usize) -> Result<Vec<f32>> {
    let embedding: Vec<f32> = serde_json::from_str(text)?;

    if embedding.len() != dimension {
        return Err(anyhow!(
            "Embedding has dimension {}, expected {}",
            embedding.len(),
            dimension
        ));
    }

    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("Embedding contains invalid values (NaN or Infinity)"));
    }

    Ok(embedding)
}
