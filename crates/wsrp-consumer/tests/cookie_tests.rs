//! Cookie tests: coalescing, Set-Cookie parsing, RFC 2109 validation.

#[cfg(test)]
mod tests {
    use url::Url;
    use wsrp_consumer::cookie::validate;
    use wsrp_consumer::*;

    const JUNE_9_2021: i64 = 1_623_233_894_000;

    fn origin() -> Url {
        Url::parse("http://portal.example.com:8080/wsrp/markup").unwrap()
    }

    fn cookie(header: &str) -> Cookie {
        let mut cookies = parse_set_cookie(header, 1_000).unwrap();
        assert_eq!(cookies.len(), 1);
        cookies.remove(0)
    }

    fn rejected(header: &str, origin: &Url) -> bool {
        matches!(validate(&cookie(header), origin), Err(CookieError::Rejected { .. }))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Coalescing
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn coalesce_joins_with_commas() {
        assert_eq!(coalesce_cookies(&["a=1", "b=2"]), "a=1,b=2");
        assert_eq!(coalesce_cookies::<&str>(&[]), "");
        assert_eq!(coalesce_cookies(&[" a=1 ", "", "b=2"]), "a=1,b=2");
    }

    #[test]
    fn split_inverts_coalesce() {
        let original = vec!["a=1".to_string(), "b=2; Path=/".to_string(), "c=3".to_string()];
        assert_eq!(split_cookies(&coalesce_cookies(&original)), original);
    }

    #[test]
    fn split_keeps_commas_of_expires_dates() {
        let header = "a=1; Expires=Wed, 09 Jun 2021 10:18:14 GMT,b=2";
        assert_eq!(
            split_cookies(header),
            vec!["a=1; Expires=Wed, 09 Jun 2021 10:18:14 GMT", "b=2"]
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Parsing
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn parses_attributes() {
        let parsed = cookie("a=\"1\"; Path=/wsrp; Max-Age=60; Secure; Version=1; Domain=.Example.com; Port=\"80,8080\"");
        assert_eq!(parsed.name, "a");
        assert_eq!(parsed.value, "1");
        assert_eq!(parsed.path.as_deref(), Some("/wsrp"));
        assert_eq!(parsed.domain.as_deref(), Some(".example.com"));
        assert_eq!(parsed.ports, Some(vec![80, 8080]));
        assert_eq!(parsed.expires_at, Some(61_000));
        assert!(parsed.secure);
        assert_eq!(parsed.version, Some(1));
    }

    #[test]
    fn parses_both_expires_formats() {
        assert_eq!(cookie("a=1; Expires=Wed, 09 Jun 2021 10:18:14 GMT").expires_at, Some(JUNE_9_2021));
        assert_eq!(cookie("a=1; expires=Wed, 09-Jun-2021 10:18:14 GMT").expires_at, Some(JUNE_9_2021));
    }

    #[test]
    fn max_age_wins_over_expires() {
        let parsed = cookie("a=1; Max-Age=0; Expires=Wed, 09 Jun 2021 10:18:14 GMT");
        assert_eq!(parsed.expires_at, Some(1_000));
        assert!(parsed.is_expired_at(1_000));
        assert!(!cookie("a=1").is_expired_at(i64::MAX));
    }

    #[test]
    fn parses_coalesced_headers() {
        let cookies = parse_set_cookie("a=1; Path=/,b=2", 0).unwrap();
        let names: Vec<&str> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn malformed_cookies_are_illegal_arguments() {
        for header in ["novalue", "=1", "a=1; Max-Age=soon", "a=1; Max-Age=-5", "a=1; Expires=someday", "a b=1"] {
            let error = parse_set_cookie(header, 0).unwrap_err();
            assert!(matches!(error, CookieError::Malformed(_)), "{header}: {error:?}");
            assert!(error.is_illegal_argument());
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn path_must_prefix_request_path() {
        assert!(rejected("a=1; Path=/admin", &origin()));
        assert!(validate(&cookie("a=1; Path=/wsrp"), &origin()).is_ok());
    }

    #[test]
    fn domain_rules() {
        assert!(rejected("a=1; Domain=example.com", &origin()));
        assert!(rejected("a=1; Domain=.com", &origin()));
        assert!(rejected("a=1; Domain=.other.com", &origin()));
        assert!(validate(&cookie("a=1; Domain=.example.com"), &origin()).is_ok());
        assert!(validate(&cookie("a=1; Domain=portal.example.com"), &origin()).is_ok());

        let deep = Url::parse("http://a.b.example.com/wsrp").unwrap();
        assert!(rejected("a=1; Domain=.example.com", &deep));
    }

    #[test]
    fn secure_cookies_need_https() {
        assert!(rejected("a=1; Secure", &origin()));
        let https = Url::parse("https://portal.example.com/wsrp").unwrap();
        assert!(validate(&cookie("a=1; Secure"), &https).is_ok());
    }

    #[test]
    fn port_list_must_contain_origin_port() {
        assert!(rejected("a=1; Port=\"80\"", &origin()));
        assert!(validate(&cookie("a=1; Port=\"8080,8443\""), &origin()).is_ok());
    }

    #[test]
    fn reserved_names_are_rejected() {
        assert!(rejected("$Version=1", &origin()));
    }

    #[test]
    fn accepted_cookies_get_default_scope() {
        let accepted = cookie("a=1").accept(&origin()).unwrap();
        assert_eq!(accepted.domain.as_deref(), Some("portal.example.com"));
        assert_eq!(accepted.path.as_deref(), Some("/wsrp"));

        assert!(accepted.matches(&Url::parse("http://portal.example.com:8080/wsrp/other").unwrap()));
        assert!(!accepted.matches(&Url::parse("http://portal.example.com:8080/admin").unwrap()));
        assert!(!accepted.matches(&Url::parse("http://other.example.com:8080/wsrp").unwrap()));

        let root = Url::parse("http://portal.example.com/service").unwrap();
        assert_eq!(cookie("a=1").accept(&root).unwrap().path.as_deref(), Some("/"));
    }

    #[test]
    fn rejected_cookie_names_the_cookie() {
        let error = cookie("session=1; Path=/admin").accept(&origin()).unwrap_err();
        assert!(matches!(error, CookieError::Rejected { ref name, .. } if name == "session"));
        assert!(error.is_illegal_argument());
    }
}
