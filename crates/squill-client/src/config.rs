//! Connection configuration.

use std::fmt;

/// Parameters for opening physical database connections.
///
/// An immutable value created once by the caller; the pool (or a standalone
/// [`Connection`](crate::Connection)) consumes it every time it opens a
/// physical connection.
///
/// # Example
///
/// ```
/// use squill_client::ConnectionInformation;
///
/// let info = ConnectionInformation::new(
///     "postgresql",
///     "jdbc:postgresql://localhost/app",
///     "app",
///     "secret",
/// );
/// assert_eq!(info.driver(), "postgresql");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInformation {
    driver: String,
    url: String,
    username: String,
    password: String,
}

impl ConnectionInformation {
    /// Create a new set of connection parameters.
    pub fn new(
        driver: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Identifier of the driver that should service this connection.
    #[must_use]
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// URL describing the path to the database.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Database username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Database password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ConnectionInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The password never reaches logs.
        f.debug_struct("ConnectionInformation")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let info = ConnectionInformation::new("mysql", "jdbc:mysql://db/app", "root", "hunter2");
        let printed = format!("{info:?}");
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("hunter2"));
    }
}
