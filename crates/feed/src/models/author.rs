use std::fmt::{Display, Formatter, Result as FmtResult};

/// The person credited with an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Author {
    /// Display name
    pub name: String,
    pub email: Option<String>,
    /// Profile or personal web page
    pub homepage: Option<String>,
}
impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into()).filter(|e: &String| !e.is_empty());
        self
    }

    pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into()).filter(|h: &String| !h.is_empty());
        self
    }
}

impl From<String> for Author {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl Display for Author {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.name, email),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_contact_details_are_dropped() {
        let author = Author::new("Jane").with_email("").with_homepage("");
        assert_eq!(author.email, None);
        assert_eq!(author.homepage, None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Author::new("Jane").to_string(), "Jane");
        assert_eq!(Author::new("Jane").with_email("jane@example.org").to_string(), "Jane <jane@example.org>");
    }
}
