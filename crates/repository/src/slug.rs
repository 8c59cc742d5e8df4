//! # Slug Extension
//!
//! Optional layer adding human-readable-identifier lookup and generation
//! on top of the repository core, for record types carrying a `slug`
//! field.

use async_trait::async_trait;
use common::error::RepositoryResult;
use rand::Rng;

use crate::entity::Record;
use crate::repository::Repository;
use crate::session::Session;
use crate::value::Value;

/// Field name under which a record's slug materializes.
const SLUG: &str = "slug";

/// Length of the random suffix appended on collision.
const SUFFIX_LEN: usize = 4;

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A record carrying a URL-safe, human-readable unique identifier.
pub trait SluggedRecord: Record {
    fn slug(&self) -> &str;
}

/// Slug lookup and generation for repositories of slugged records.
#[async_trait]
pub trait SlugRepository<T: SluggedRecord> {
    /// Select a record by slug value.
    async fn get_by_slug(
        &self,
        session: &mut dyn Session,
        slug: &str,
    ) -> RepositoryResult<Option<T>>;

    /// Derive a slug for `source` that is free in the collection.
    ///
    /// When the straight slugification is taken, a 4-character random
    /// lowercase-alphanumeric suffix is appended instead. The suffixed
    /// value is not re-checked: the residual collision probability is
    /// accepted, not eliminated. Callers needing a hard guarantee should
    /// back the slug column with a uniqueness constraint and retry on
    /// `Conflict`.
    async fn get_available_slug(
        &self,
        session: &mut dyn Session,
        source: &str,
    ) -> RepositoryResult<String>;
}

#[async_trait]
impl<T: SluggedRecord> SlugRepository<T> for Repository<T> {
    async fn get_by_slug(
        &self,
        session: &mut dyn Session,
        slug: &str,
    ) -> RepositoryResult<Option<T>> {
        self.get_one_or_none(session, &[(SLUG, Value::Text(slug.to_string()))])
            .await
    }

    async fn get_available_slug(
        &self,
        session: &mut dyn Session,
        source: &str,
    ) -> RepositoryResult<String> {
        let slug = slugify(source);
        let taken: Option<T> = self
            .get_one_or_none(session, &[(SLUG, Value::Text(slug.clone()))])
            .await?;
        if taken.is_none() {
            return Ok(slug);
        }
        Ok(format!("{slug}-{}", random_suffix()))
    }
}

/// Convert free text into a URL-safe slug: lowercase ASCII alphanumerics
/// joined by single dashes. Whitespace, dashes and underscores act as
/// word boundaries; anything else is dropped. Non-ASCII characters are
/// not transliterated.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut boundary = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if boundary && !slug.is_empty() {
                slug.push('-');
            }
            boundary = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            boundary = true;
        }
    }
    slug
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..SUFFIX_CHARSET.len());
            SUFFIX_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  leading and trailing  "), "leading-and-trailing");
        assert_eq!(slugify("Already-Slugged"), "already-slugged");
        assert_eq!(slugify("snake_case_name"), "snake-case-name");
        assert_eq!(slugify("multiple   spaces"), "multiple-spaces");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_random_suffix_shape() {
        for _ in 0..32 {
            let suffix = random_suffix();
            assert_eq!(suffix.len(), SUFFIX_LEN);
            assert!(suffix
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
        }
    }
}
