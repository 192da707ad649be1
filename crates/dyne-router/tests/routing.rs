//! Property tests for path resolution.

use dyne_router::{MethodSet, Protocol, Resolution, Router};
use http::Method;
use proptest::prelude::*;

fn fixture() -> Router<u32> {
    let mut router = Router::new();
    for (i, template) in [
        "/items/{id:int}",
        "/items/{name}",
        "/items/{id:int}/tags/{tag}",
        "/prices/{amount:float}",
        "/files/{rest:path}",
        "/users/me",
        "/users/{user}",
    ]
    .into_iter()
    .enumerate()
    {
        let t = router.compile(template).unwrap();
        let id = u32::try_from(i).unwrap();
        router.insert(&t, MethodSet::new().get(), Protocol::Http, id);
    }
    router
}

fn outcome(router: &Router<u32>, path: &str) -> Option<(u32, String)> {
    match router.resolve(&Method::GET, path, Protocol::Http) {
        Resolution::Matched(m) => Some((*m.value, format!("{:?}", m.params))),
        _ => None,
    }
}

proptest! {
    #[test]
    fn test_match_is_deterministic(path in "(/[a-z0-9.%]{0,6}){0,4}") {
        let router = fixture();
        prop_assert_eq!(outcome(&router, &path), outcome(&router, &path));
    }

    #[test]
    fn test_digits_route_to_int(n in 0u32..1_000_000) {
        let router = fixture();
        let (id, _) = outcome(&router, &format!("/items/{n}")).unwrap();
        prop_assert_eq!(id, 0);
    }

    #[test]
    fn test_non_digits_route_to_str(name in "[a-z][a-z0-9]{0,8}") {
        let router = fixture();
        let (id, _) = outcome(&router, &format!("/items/{name}")).unwrap();
        prop_assert_eq!(id, 1);
    }

    #[test]
    fn test_built_urls_route_back(n in 0i64..1_000_000, tag in "[a-z]{1,8}") {
        let router = fixture();
        let template = router.compile("/items/{id:int}/tags/{tag}").unwrap();
        let url = template.build([("id", n.into()), ("tag", dyne_router::ParamValue::from(tag.as_str()))]).unwrap();
        match router.resolve(&Method::GET, &url, Protocol::Http) {
            Resolution::Matched(m) => {
                prop_assert_eq!(*m.value, 2);
                prop_assert_eq!(m.params.get_int("id"), Some(n));
                prop_assert_eq!(m.params.get_str("tag"), Some(tag.as_str()));
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}

#[test]
fn test_malformed_float_is_not_found() {
    let router = fixture();
    assert!(outcome(&router, "/prices/1.50").is_some());
    assert!(outcome(&router, "/prices/1.").is_none());
    assert!(outcome(&router, "/prices/-1").is_none());
}

#[test]
fn test_unknown_method_reports_allow() {
    let router = fixture();
    match router.resolve(&Method::POST, "/users/me", Protocol::Http) {
        Resolution::MethodNotAllowed { allowed } => assert_eq!(allowed.to_string(), "GET"),
        other => panic!("unexpected {other:?}"),
    }
}
