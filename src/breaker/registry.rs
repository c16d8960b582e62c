//! Named breakers, created on first use and shared for the life of the process.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, LazyLock, PoisonError, RwLock},
};

use super::{
    Breaker, BreakerError, BreakerSettings, Promise,
    proba::{Proba, RandomProba},
};

static REGISTRY: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::default()));

/// Name → [`Breaker`] map with atomic get-or-create.
///
/// Breakers are never removed, so statistics for a name survive for as long as
/// the registry does.
pub struct Registry {
    settings: BreakerSettings,
    proba: Arc<dyn Proba>,
    breakers: RwLock<HashMap<String, Breaker>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            settings: BreakerSettings::default(),
            proba: Arc::new(RandomProba),
            breakers: RwLock::default(),
        }
    }
}

impl Registry {
    pub fn new(settings: BreakerSettings) -> Result<Self, BreakerError> {
        Self::with_proba(settings, RandomProba)
    }

    /// A registry whose breakers all draw admission decisions from `proba`.
    pub fn with_proba(settings: BreakerSettings, proba: impl Proba) -> Result<Self, BreakerError> {
        settings.validate()?;
        Ok(Self {
            settings,
            proba: Arc::new(proba),
            breakers: RwLock::default(),
        })
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Returns the breaker for `name`, creating it on first request.
    ///
    /// Concurrent first lookups of the same name all observe one instance.
    pub fn get_breaker(&self, name: &str) -> Breaker {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(breaker) = breakers.get(name) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        breakers
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(message = "Creating breaker.", breaker = %name);
                Breaker::build(name.to_owned(), &self.settings, Arc::clone(&self.proba))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn allow(&self, name: &str) -> Result<Promise, BreakerError> {
        self.get_breaker(name).allow()
    }

    pub fn do_req<T, E, F>(&self, name: &str, req: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<BreakerError> + fmt::Display,
    {
        self.get_breaker(name).call(req)
    }

    pub fn do_with_acceptable<T, E, F, A>(&self, name: &str, req: F, acceptable: A) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        A: Fn(&E) -> bool,
        E: From<BreakerError> + fmt::Display,
    {
        self.get_breaker(name).call_with_acceptable(req, acceptable)
    }

    pub fn do_with_fallback<T, E, F, FB>(&self, name: &str, req: F, fallback: FB) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        FB: FnOnce(BreakerError) -> Result<T, E>,
        E: From<BreakerError> + fmt::Display,
    {
        self.get_breaker(name).call_with_fallback(req, fallback)
    }

    pub fn do_with_fallback_acceptable<T, E, F, FB, A>(
        &self,
        name: &str,
        req: F,
        fallback: FB,
        acceptable: A,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        FB: FnOnce(BreakerError) -> Result<T, E>,
        A: Fn(&E) -> bool,
        E: From<BreakerError> + fmt::Display,
    {
        self.get_breaker(name).do_req(req, Some(fallback), acceptable)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.settings)
            .field("breakers", &self.len())
            .finish_non_exhaustive()
    }
}

/// The process-wide registry used by the free functions in this module.
pub fn registry() -> Arc<Registry> {
    Arc::clone(&REGISTRY)
}

/// Resource name for `method` on `target`, e.g.
/// `breaker_name("dns:///users:8080", "/users.Users/Get")` gives
/// `"dns:/users:8080/users.Users/Get"`.
///
/// The two parts are joined and cleaned the way slash-separated paths are:
/// repeated slashes collapse, `.` segments vanish, `..` removes the segment
/// before it and a leading `/` is kept. The same endpoint therefore always
/// maps to the same breaker regardless of stray slashes.
pub fn breaker_name(target: &str, method: &str) -> String {
    let joined = match (target.is_empty(), method.is_empty()) {
        (true, true) => return String::new(),
        (true, false) => method.to_owned(),
        (false, true) => target.to_owned(),
        (false, false) => format!("{target}/{method}"),
    };
    clean_path(&joined)
}

fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            _ => segments.push(segment),
        }
    }

    let cleaned = segments.join("/");
    match (rooted, cleaned.is_empty()) {
        (true, _) => format!("/{cleaned}"),
        (false, true) => ".".to_owned(),
        (false, false) => cleaned,
    }
}

pub fn get_breaker(name: &str) -> Breaker {
    REGISTRY.get_breaker(name)
}

pub fn allow(name: &str) -> Result<Promise, BreakerError> {
    REGISTRY.allow(name)
}

/// Runs `req` through the breaker for `name`, counting every `Err` as a
/// failure.
pub fn do_req<T, E, F>(name: &str, req: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<BreakerError> + fmt::Display,
{
    REGISTRY.do_req(name, req)
}

/// Runs `req` through the breaker for `name`; errors for which `acceptable`
/// returns `true` count as successes.
pub fn do_with_acceptable<T, E, F, A>(name: &str, req: F, acceptable: A) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    A: Fn(&E) -> bool,
    E: From<BreakerError> + fmt::Display,
{
    REGISTRY.do_with_acceptable(name, req, acceptable)
}

pub fn do_with_fallback<T, E, F, FB>(name: &str, req: F, fallback: FB) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    FB: FnOnce(BreakerError) -> Result<T, E>,
    E: From<BreakerError> + fmt::Display,
{
    REGISTRY.do_with_fallback(name, req, fallback)
}

pub fn do_with_fallback_acceptable<T, E, F, FB, A>(
    name: &str,
    req: F,
    fallback: FB,
    acceptable: A,
) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    FB: FnOnce(BreakerError) -> Result<T, E>,
    A: Fn(&E) -> bool,
    E: From<BreakerError> + fmt::Display,
{
    REGISTRY.do_with_fallback_acceptable(name, req, fallback, acceptable)
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;
    use crate::breaker::History;

    #[test]
    fn same_name_same_breaker() {
        let registry = Registry::default();
        let first = registry.get_breaker("users/users.Users/Get");
        first.mark_failure();

        let second = registry.get_breaker("users/users.Users/Get");
        assert!(first.same_as(&second));
        assert_eq!(second.history(), History { accepts: 0, total: 1 });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_names_are_independent() {
        let registry = Registry::default();
        let get = registry.get_breaker("users/users.Users/Get");
        let list = registry.get_breaker("users/users.Users/List");
        get.mark_failure();

        assert!(!get.same_as(&list));
        assert_eq!(list.history(), History::default());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_first_use_converges_on_one_breaker() {
        let registry = Registry::default();
        let threads = 16;
        let barrier = Barrier::new(threads);

        let breakers: Vec<Breaker> = thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        let breaker = registry.get_breaker("orders/orders.Orders/Create");
                        breaker.mark_success();
                        breaker
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.len(), 1);
        assert!(breakers.iter().all(|b| b.same_as(&breakers[0])));
        assert_eq!(breakers[0].history().total, threads as i64);
    }

    #[test]
    fn registry_settings_apply_to_new_breakers() {
        let settings = BreakerSettings::builder().protection(1_000).build();
        let registry = Registry::new(settings).unwrap();
        let breaker = registry.get_breaker("svc/protected");
        for _ in 0..500 {
            breaker.mark_failure();
        }
        assert_eq!(breaker.drop_ratio(), 0.0);
    }

    #[test]
    fn invalid_settings_are_refused() {
        let settings = BreakerSettings::builder().buckets(0).build();
        assert!(matches!(
            Registry::new(settings),
            Err(BreakerError::InvalidSettings { .. })
        ));
    }

    #[test]
    fn do_with_acceptable_uses_the_named_breaker() {
        let registry = Registry::default();
        let result: Result<(), crate::Error> = registry.do_with_acceptable(
            "billing/billing.Billing/Charge",
            || Err("card declined".into()),
            |error: &crate::Error| error.to_string() == "card declined",
        );

        assert_eq!(result.unwrap_err().to_string(), "card declined");
        let history = registry.get_breaker("billing/billing.Billing/Charge").history();
        assert_eq!(history, History { accepts: 1, total: 1 });
    }

    #[test]
    fn process_wide_helpers_share_state() {
        let name = "registry-tests/helpers.Helpers/Ping";
        do_req(name, || Ok::<_, BreakerError>(())).unwrap();
        allow(name).unwrap().reject();
        let fallback: Result<u8, BreakerError> = do_with_fallback(name, || Ok(1), |_| Ok(2));
        assert_eq!(fallback, Ok(1));
        let tolerated: Result<(), BreakerError> = do_with_fallback_acceptable(
            name,
            || Err(BreakerError::ServiceUnavailable),
            |_| Ok(()),
            |_| true,
        );
        assert!(tolerated.is_err());

        assert!(get_breaker(name).same_as(&registry().get_breaker(name)));
        assert_eq!(get_breaker(name).history(), History { accepts: 3, total: 4 });
    }

    #[test]
    fn names_are_joined_like_paths() {
        assert_eq!(breaker_name("users:8080", "/users.Users/Get"), "users:8080/users.Users/Get");
        assert_eq!(breaker_name("users:8080/", "users.Users/Get"), "users:8080/users.Users/Get");
        assert_eq!(breaker_name("dns:///users", "/a/./b"), "dns:/users/a/b");
        assert_eq!(breaker_name("", "/health"), "/health");
        assert_eq!(breaker_name("", ""), "");
    }

    #[test]
    fn parent_segments_are_resolved() {
        assert_eq!(breaker_name("users:8080/v1", "../users.Users/Get"), "users:8080/users.Users/Get");
        assert_eq!(breaker_name("/", "../../health"), "/health");
        assert_eq!(breaker_name("..", "a/../../b"), "../../b");
        assert_eq!(breaker_name("users", ".."), ".");
    }
}
