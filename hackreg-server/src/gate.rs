//! Authorization gate in front of the mappers
//!
//! Request handlers call [`authorize`] (or wrap the mapper call in
//! [`guarded`]) before touching any mapper, so a denied request never
//! acquires a connection.

use std::future::Future;

use hackreg_core::{DataResult, Operation, PermissionRegistry, Principal};

/// Fail with [`DataError::Unauthorized`](hackreg_core::DataError::Unauthorized)
/// unless `principal` may perform `operation` on `entity`.
///
/// `target_owner` is the id owning the record acted on, for rules that only
/// allow principals to act on their own records.
pub fn authorize(
    registry: &PermissionRegistry,
    entity: &str,
    operation: Operation,
    principal: &Principal,
    target_owner: Option<&str>,
) -> DataResult<()> {
    registry.check(entity, operation, principal, target_owner).inspect_err(|_| {
        tracing::info!(
            entity,
            %operation,
            principal = principal.id.as_deref().unwrap_or("-"),
            role = %principal.role,
            "request denied"
        );
    })
}

/// Run `action` only once `principal` is authorized.
pub async fn guarded<T, F, Fut>(
    registry: &PermissionRegistry,
    entity: &str,
    operation: Operation,
    principal: &Principal,
    target_owner: Option<&str>,
    action: F,
) -> DataResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = DataResult<T>>,
{
    authorize(registry, entity, operation, principal, target_owner)?;
    action().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use hackreg_core::{DataError, ErrorKind, PermissionRule, Role};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn registry() -> PermissionRegistry {
        let mut builder = PermissionRegistry::builder();
        builder.register_rule(
            "notes",
            PermissionRule::allow([Operation::Read], [Role::Director]),
        );
        builder.build()
    }

    #[test]
    fn authorize_reports_the_denied_operation() {
        let registry = registry();
        let director = Principal::new("d1", Role::Director);
        let volunteer = Principal::new("v1", Role::Volunteer);

        assert!(authorize(&registry, "notes", Operation::Read, &director, None).is_ok());

        let err = authorize(&registry, "notes", Operation::Read, &volunteer, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(matches!(
            err,
            DataError::Unauthorized {
                operation: Operation::Read,
                role: Role::Volunteer,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn guarded_skips_action_when_denied() {
        let registry = registry();
        let ran = AtomicBool::new(false);

        let result = guarded(
            &registry,
            "notes",
            Operation::Delete,
            &Principal::new("d1", Role::Director),
            None,
            || async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Unauthorized);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn guarded_runs_action_when_allowed() {
        let registry = registry();
        let value = guarded(
            &registry,
            "notes",
            Operation::Read,
            &Principal::new("d1", Role::Director),
            None,
            || async { Ok(7) },
        )
        .await
        .unwrap();
        assert_eq!(value, 7);
    }
}
