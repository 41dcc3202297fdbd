#[cfg(test)]
mod tests {
    use crate::address::*;
    use proptest::prelude::*;

    fn addr(text: &str) -> Address {
        Address::parse(text).unwrap()
    }

    // A small arena-backed tree used as an address space.
    struct Node {
        name: String,
        parent: Option<usize>,
        children: Vec<usize>,
    }

    struct Tree {
        nodes: Vec<Node>,
    }

    impl Tree {
        fn new() -> Self {
            Self {
                nodes: vec![Node {
                    name: String::new(),
                    parent: None,
                    children: Vec::new(),
                }],
            }
        }

        fn add(&mut self, parent: usize, name: &str) -> usize {
            let id = self.nodes.len();
            self.nodes.push(Node {
                name: name.to_string(),
                parent: Some(parent),
                children: Vec::new(),
            });
            self.nodes[parent].children.push(id);
            id
        }

        fn path(&self, id: usize) -> String {
            self.address(&id).to_string()
        }
    }

    impl AddressSpace for Tree {
        type Node = usize;

        fn root(&self) -> usize {
            0
        }

        fn parent(&self, node: &usize) -> Option<usize> {
            self.nodes[*node].parent
        }

        fn children(&self, node: &usize) -> Vec<usize> {
            self.nodes[*node].children.clone()
        }

        fn address(&self, node: &usize) -> Address {
            let mut names = Vec::new();
            let mut current = Some(*node);
            while let Some(id) = current {
                if id != 0 {
                    names.push(self.nodes[id].name.clone());
                }
                current = self.nodes[id].parent;
            }
            names.reverse();
            let elements = names.iter().map(|n| Element::parse(n).unwrap()).collect();
            Address::create(true, false, elements)
        }
    }

    /// root -> a -> {a, b -> {a, b, c}}, root -> d
    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        let a = tree.add(0, "a");
        tree.add(a, "a");
        let ab = tree.add(a, "b");
        tree.add(ab, "a");
        tree.add(ab, "b");
        tree.add(ab, "c");
        tree.add(0, "d");
        tree
    }

    fn resolve(tree: &Tree, query: &str) -> Result<Vec<String>, ResolveError> {
        let resolution = resolve_address(tree, &0, &addr(query))?;
        Ok(resolution.matches().map(|id| tree.path(*id)).collect())
    }

    #[test]
    fn test_parse_flags_and_elements() {
        let a = addr(":a?:b");
        assert!(a.is_absolute());
        assert!(!a.is_container());
        assert_eq!(a.len(), 2);
        assert!(a.elements()[0].is_fallible());
        assert_eq!(a.elements()[0].value(), "a");
        assert!(!a.elements()[1].is_fallible());

        let c = addr("a:b:");
        assert!(!c.is_absolute());
        assert!(c.is_container());
        assert_eq!(c.to_string(), "a:b:");
    }

    #[test]
    fn test_root_and_empty() {
        let root = addr(":");
        assert!(root.is_root());
        assert!(root.is_absolute());
        assert!(root.is_container());
        assert_eq!(root.to_string(), ":");
        assert_eq!(root, Address::root());

        let empty = addr("");
        assert!(empty.is_empty());
        assert!(!empty.is_absolute());
        assert!(!empty.is_container());
        assert_eq!(empty, Address::empty());
    }

    #[test]
    fn test_well_known_addresses() {
        assert_eq!(Address::current(), addr("."));
        assert_eq!(Address::parent_dir(), addr(".."));
        assert_eq!(Address::wildcard(), addr("*"));
        assert_eq!(Address::recursive_wildcard(), addr("**"));
        assert_eq!(Address::parent_dir().to_string(), "..");
    }

    #[test]
    fn test_parse_rejects_invalid_elements() {
        assert!(Address::parse("a::b").is_err());
        assert!(Address::parse("::").is_err());
        assert!(Address::parse("a b").is_err());
        assert!(Address::parse("test??").is_err());
        assert!(Address::parse("a:$x").is_err());
    }

    #[test]
    fn test_parse_is_interned() {
        let a = addr(":some:interned:address");
        let b = addr(":some:interned:address");
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), "Address(':some:interned:address')");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(addr("").normalize(false), addr("."));
        assert_eq!(addr(".:").normalize(false), addr("."));
        assert_eq!(addr(".:").normalize(true), addr(".:"));
        assert_eq!(addr(":a:.:b").normalize(false), addr(":a:b"));
        assert_eq!(addr(":a:..:b").normalize(false), addr(":b"));
        assert_eq!(addr("..:.:b").normalize(false), addr("..:b"));
        assert_eq!(addr("a:b:").normalize(false), addr("a:b"));
        assert_eq!(addr("a:b:").normalize(true), addr("a:b:"));
        assert_eq!(addr("a:b:.").normalize(true), addr("a:b"));
        assert_eq!(addr("a:..:b").normalize(false), addr("b"));
    }

    #[test]
    fn test_pathological_root_is_container() {
        let normalized = addr(":a:..").normalize(false);
        assert!(normalized.is_root());
        assert!(normalized.is_container());
        assert_eq!(normalized.to_string(), ":");
    }

    #[test]
    fn test_concat() {
        assert_eq!(addr(":a").concat(&addr("b:c")), addr(":a:b:c"));
        assert_eq!(addr(":a").concat(&addr(":b")), addr(":b"));
        assert_eq!(addr(":a").concat(&addr(".")), addr(":a:."));
        assert_eq!(addr(":a").concat(&addr("b:")).to_string(), ":a:b:");
    }

    #[test]
    fn test_append_and_join() {
        assert_eq!(Address::root().join("a").unwrap(), addr(":a"));
        assert_eq!(addr(":a:.").join(".").unwrap(), addr(":a:.:."));
        assert!(Address::root().join("a b").is_err());
    }

    #[test]
    fn test_set_container() {
        assert_eq!(addr(":a").set_container(true).unwrap().to_string(), ":a:");
        assert_eq!(addr(":a:").set_container(false).unwrap().to_string(), ":a");
        assert_eq!(addr(":").set_container(true).unwrap(), Address::root());
        assert_eq!(
            addr(":").set_container(false),
            Err(AddressError::RootIsAlwaysContainer)
        );
        assert_eq!(addr("").set_container(true), Err(AddressError::EmptyContainer));
    }

    #[test]
    fn test_name() {
        assert_eq!(addr(":a:b").name().unwrap(), "b");
        assert_eq!(addr("a:b?").name().unwrap(), "b");
        assert!(matches!(addr(":").name(), Err(AddressError::NoName(_))));
        assert!(matches!(addr("").name(), Err(AddressError::NoName(_))));
    }

    #[test]
    fn test_parent() {
        assert_eq!(addr(":a:b").parent().unwrap(), addr(":a"));
        assert_eq!(addr(":a").parent().unwrap(), addr(":"));
        assert_eq!(addr("a").parent().unwrap(), addr("."));
        assert_eq!(addr(".").parent().unwrap(), addr(".."));
        assert_eq!(addr("..").parent().unwrap(), addr("..:.."));
        assert_eq!(addr(":a:b:").parent().unwrap().to_string(), ":a:");
        assert_eq!(addr(":").parent(), Err(AddressError::RootHasNoParent));
        assert_eq!(addr("").parent(), Err(AddressError::EmptyHasNoParent));
    }

    #[test]
    fn test_is_concrete() {
        assert!(addr(":a:b").is_concrete());
        assert!(!addr("a:b").is_concrete());
        assert!(!addr(":*:b").is_concrete());
        assert!(!addr(":a:b?").is_concrete());
    }

    #[test]
    fn test_element_glob_matching() {
        let element = Element::parse("te*t").unwrap();
        assert!(element.matches("test"));
        assert!(element.matches("tet"));
        assert!(!element.matches("tests"));
        assert!(Element::parse("*").unwrap().matches("anything.with.dots"));
        assert!(Element::parse("a.b").unwrap().matches("a.b"));
        assert!(!Element::parse("a.b").unwrap().matches("axb"));
    }

    #[test]
    fn test_glob_elements_compare_by_value() {
        let first = Element::parse("lib*?").unwrap();
        let second = Element::parse("lib*?").unwrap();
        assert_eq!(first, second);
        assert_ne!(first, Element::parse("lib*").unwrap());
        assert!(Element::parse("a*").unwrap() < Element::parse("b").unwrap());

        let wildcard_addr = Address::wildcard();
        let wildcard = &wildcard_addr.elements()[0];
        assert_eq!(wildcard, &Element::parse("*").unwrap());
        assert!(wildcard.matches("anything"));
        assert!(Address::recursive_wildcard().elements()[0].matches("a.b"));
        assert!(!Address::parent_dir().elements()[0].matches("x"));
    }

    #[test]
    fn test_intern_table_is_bounded() {
        for i in 0..=MAX_INTERNED {
            addr(&format!(":bounded:n{i}"));
        }
        assert!(Address::interned_count() <= MAX_INTERNED);

        let late = addr(":bounded:after:the:table:filled");
        assert_eq!(late, addr(":bounded:after:the:table:filled"));
        assert_eq!(late.elements().len(), 4);
    }

    #[test]
    fn test_serde_as_string() {
        let a = addr(":a:b?:");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\":a:b?:\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn test_normalize_name() {
        assert!(is_valid_name("build-docs"));
        assert!(!is_valid_name("build docs!"));
        assert_eq!(normalize_name("build docs!"), "build-docs-");
        assert_eq!(normalize_name("a  b"), "a-b");
    }

    #[test]
    fn test_resolve_single_wildcard_in_order() {
        let tree = sample_tree();
        assert_eq!(
            resolve(&tree, ":a:b:*").unwrap(),
            vec![":a:b:a", ":a:b:b", ":a:b:c"]
        );
    }

    #[test]
    fn test_resolve_recursive_wildcard_matches_empty_suffix() {
        let tree = sample_tree();
        assert_eq!(
            resolve(&tree, ":**:a").unwrap(),
            vec![":a", ":a:a", ":a:b:a"]
        );
    }

    #[test]
    fn test_resolve_fallible_element() {
        let tree = sample_tree();
        assert!(resolve(&tree, ":a:dontexist?").unwrap().is_empty());
        assert!(matches!(
            resolve(&tree, ":a:dontexist"),
            Err(ResolveError::Unresolved(_))
        ));
    }

    #[test]
    fn test_resolution_error_records_prefix_and_remainder() {
        let tree = sample_tree();
        let err = match resolve_address(&tree, &0, &addr(":a:c")) {
            Err(ResolveError::Unresolved(err)) => err,
            other => panic!("expected resolution error, got {other:?}"),
        };
        assert_eq!(err.failed_at, addr(":a"));
        assert_eq!(err.remainder, addr("c"));
        assert_eq!(err.nonexistent_address(), addr(":a:c"));
        assert_eq!(
            err.to_string(),
            "Could not resolve address ':a:c' in context ':'. The failure occurred at address ':a' \
             trying to resolve the remainder 'c'. The address ':a:c' does not exist."
        );
    }

    #[test]
    fn test_resolve_relative_and_parent() {
        let tree = sample_tree();
        // node 2 is :a:a
        let resolution = resolve_address(&tree, &2, &addr("..:b")).unwrap();
        let found: Vec<String> = resolution.matches().map(|id| tree.path(*id)).collect();
        assert_eq!(found, vec![":a:b"]);

        let resolution = resolve_address(&tree, &2, &addr(".")).unwrap();
        let found: Vec<String> = resolution.matches().map(|id| tree.path(*id)).collect();
        assert_eq!(found, vec![":a:a"]);
    }

    #[test]
    fn test_resolve_recursive_wildcard_requires_a_match() {
        let tree = sample_tree();
        let err = match resolve_address(&tree, &0, &addr("**:zzz")) {
            Err(ResolveError::Unresolved(err)) => err,
            other => panic!("expected resolution error, got {other:?}"),
        };
        assert!(err.is_recursive_wildcard_failure());
        assert_eq!(err.nonexistent_address(), addr(":**:zzz"));
        assert!(resolve(&tree, "**:zzz?").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_trailing_recursive_wildcard_excludes_start() {
        let tree = sample_tree();
        assert_eq!(
            resolve(&tree, ":a:b:**").unwrap(),
            vec![":a:b:a", ":a:b:b", ":a:b:c"]
        );
    }

    #[test]
    fn test_resolve_container_only_matches_nodes_with_children() {
        let tree = sample_tree();
        assert_eq!(resolve(&tree, ":*:").unwrap(), vec![":a"]);
        assert_eq!(resolve(&tree, ":").unwrap(), vec![":"]);
    }

    #[test]
    fn test_resolve_is_restartable() {
        let tree = sample_tree();
        let resolution = resolve_address(&tree, &0, &addr(":a:*")).unwrap();
        let first: Vec<usize> = resolution.matches().copied().collect();
        let second: Vec<usize> = resolution.matches().copied().collect();
        assert_eq!(first, second);
        assert_eq!(resolution.into_matches().len(), 2);
    }

    #[test]
    fn test_resolve_empty_query_is_an_error() {
        let tree = sample_tree();
        assert!(matches!(
            resolve_address(&tree, &0, &Address::empty()),
            Err(ResolveError::EmptyQuery)
        ));
    }

    fn element_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("a".to_string()),
            Just("b".to_string()),
            Just("..".to_string()),
            Just(".".to_string()),
            Just("*".to_string()),
            Just("**".to_string()),
            Just("x?".to_string()),
            "[a-z][a-z0-9_-]{0,5}",
        ]
    }

    fn address_text_strategy() -> impl Strategy<Value = String> {
        (
            any::<bool>(),
            any::<bool>(),
            prop::collection::vec(element_strategy(), 0..6),
        )
            .prop_map(|(absolute, container, elements)| {
                let mut text = String::new();
                if absolute {
                    text.push(':');
                }
                text.push_str(&elements.join(":"));
                if container && !elements.is_empty() {
                    text.push(':');
                }
                text
            })
    }

    proptest! {
        #[test]
        fn prop_format_parse_round_trip(text in address_text_strategy()) {
            let parsed = Address::parse(&text).unwrap();
            prop_assert_eq!(parsed.to_string(), text);
        }

        #[test]
        fn prop_normalize_is_idempotent(text in address_text_strategy(), keep in any::<bool>()) {
            let once = Address::parse(&text).unwrap().normalize(keep);
            let twice = once.normalize(keep);
            prop_assert_eq!(twice, once);
        }
    }
}
