use std::future::Future;

/// Two-phase form submission: apply the optimistic local change (clearing a
/// draft, marking a subscription) and keep a snapshot, attempt the
/// authoritative write, and restore the snapshot if the write fails. The
/// rollback path is a required argument so no form can forget it.
pub async fn run<S, T, E, Fut>(
    apply: impl FnOnce() -> S,
    commit: Fut,
    rollback: impl FnOnce(S),
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let snapshot = apply();
    match commit.await {
        Ok(value) => Ok(value),
        Err(e) => {
            rollback(snapshot);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Clone, PartialEq, Debug)]
    struct Draft {
        name: String,
        message: String,
    }

    #[tokio::test]
    async fn success_keeps_the_optimistic_state() {
        let draft = RefCell::new(Some(Draft { name: "Jane".into(), message: "hi".into() }));
        let result: Result<i32, &str> = run(
            || draft.borrow_mut().take(),
            async { Ok(7) },
            |snapshot| *draft.borrow_mut() = snapshot,
        )
        .await;
        assert_eq!(result, Ok(7));
        assert!(draft.borrow().is_none());
    }

    #[tokio::test]
    async fn failure_restores_the_snapshot() {
        let original = Draft { name: "Jane".into(), message: "hi".into() };
        let draft = RefCell::new(Some(original.clone()));
        let result: Result<i32, &str> = run(
            || draft.borrow_mut().take(),
            async { Err("backend down") },
            |snapshot| *draft.borrow_mut() = snapshot,
        )
        .await;
        assert_eq!(result, Err("backend down"));
        assert_eq!(draft.borrow().as_ref(), Some(&original));
    }
}
