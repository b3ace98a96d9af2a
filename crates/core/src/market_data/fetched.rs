/// Outcome of one fetch, keeping "no rows" apart from "the call failed".
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Data(T),
    Empty,
    Failed(String),
}

impl<T> Fetched<T> {
    pub fn from_result(res: anyhow::Result<T>, is_empty: impl FnOnce(&T) -> bool) -> Self {
        match res {
            Ok(v) if is_empty(&v) => Fetched::Empty,
            Ok(v) => Fetched::Data(v),
            Err(err) => Fetched::Failed(format!("{err:#}")),
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Fetched::Data(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Fetched::Failed(_))
    }

    /// Prefers whichever side has data. Otherwise a failure on either side wins over `Empty`.
    pub fn or(self, other: Fetched<T>) -> Fetched<T> {
        match (self, other) {
            (Fetched::Data(v), _) | (_, Fetched::Data(v)) => Fetched::Data(v),
            (Fetched::Failed(a), Fetched::Failed(b)) => Fetched::Failed(format!("{a}; {b}")),
            (Fetched::Failed(e), Fetched::Empty) | (Fetched::Empty, Fetched::Failed(e)) => {
                Fetched::Failed(e)
            }
            (Fetched::Empty, Fetched::Empty) => Fetched::Empty,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Data(v) => Fetched::Data(f(v)),
            Fetched::Empty => Fetched::Empty,
            Fetched::Failed(e) => Fetched::Failed(e),
        }
    }

    pub fn data(self) -> Option<T> {
        match self {
            Fetched::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn data_or_else(self, f: impl FnOnce() -> T) -> T {
        self.data().unwrap_or_else(f)
    }

    pub fn data_or_default(self) -> T
    where
        T: Default,
    {
        self.data().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_results() {
        let ok: Fetched<Vec<u8>> = Fetched::from_result(Ok(vec![1]), Vec::is_empty);
        assert_eq!(ok, Fetched::Data(vec![1]));
        let empty: Fetched<Vec<u8>> = Fetched::from_result(Ok(vec![]), Vec::is_empty);
        assert_eq!(empty, Fetched::Empty);
        let failed: Fetched<Vec<u8>> =
            Fetched::from_result(Err(anyhow::anyhow!("boom")), Vec::is_empty);
        assert!(failed.is_failed());
    }

    #[test]
    fn or_prefers_data_then_failure() {
        let a: Fetched<i32> = Fetched::Failed("primary down".into());
        assert_eq!(a.clone().or(Fetched::Data(2)), Fetched::Data(2));
        assert_eq!(Fetched::Data(1).or(a.clone()), Fetched::Data(1));
        assert_eq!(a.clone().or(Fetched::Empty), a);
        assert_eq!(Fetched::<i32>::Empty.or(Fetched::Empty), Fetched::Empty);
        assert_eq!(
            a.or(Fetched::Failed("secondary down".into())),
            Fetched::Failed("primary down; secondary down".into())
        );
    }
}
