use std::fmt::Formatter;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// Statement failed, including constraint violations
    Storage(diesel::result::Error),
    /// No connection could be checked out of the pool
    Connection(r2d2::Error),
}

impl RepoError {
    /// True for unique and foreign key violations.
    pub fn is_constraint_violation(&self) -> bool {
        use diesel::result::DatabaseErrorKind;
        use diesel::result::Error;

        match self {
            RepoError::Storage(Error::DatabaseError(kind, _)) => matches!(
                kind,
                DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for RepoError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let msg = match self {
            RepoError::Storage(inner) => {
                format!("Storage: {}", inner)
            },
            RepoError::Connection(inner) => {
                format!("Connection: {}", inner)
            },
        };
        write!(f, "Address repository error: {}", msg)
    }
}

impl std::error::Error for RepoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepoError::Storage(inner) => Some(inner),
            RepoError::Connection(inner) => Some(inner),
        }
    }
}

impl From<diesel::result::Error> for RepoError {
    fn from(error: diesel::result::Error) -> Self {
        RepoError::Storage(error)
    }
}

impl From<r2d2::Error> for RepoError {
    fn from(error: r2d2::Error) -> Self {
        RepoError::Connection(error)
    }
}

#[cfg(test)]
mod tests {
    use diesel::result::{DatabaseErrorKind, Error};

    use super::*;

    #[test]
    fn not_found_is_a_storage_error_but_not_a_constraint_violation() {
        let err = RepoError::from(Error::NotFound);
        assert!(!err.is_constraint_violation());
        assert_eq!(err.to_string(), "Address repository error: Storage: NotFound");
    }

    #[test]
    fn foreign_key_violation_is_a_constraint_violation() {
        let err = RepoError::from(Error::DatabaseError(
            DatabaseErrorKind::ForeignKeyViolation,
            Box::new(String::from("fk_id_signalement")),
        ));
        assert!(err.is_constraint_violation());
    }
}
