#[cfg(test)]
mod tests {
    use crate::address::Address;
    use crate::property::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn owner(text: &str) -> Address {
        Address::parse(text).unwrap()
    }

    fn prop(name: &str, kind: TypeDescriptor) -> Property {
        Property::new(owner(":task"), name, kind, false)
    }

    #[test]
    fn test_union_order_decides_stored_type() {
        let str_first = prop("a", TypeDescriptor::union([TypeDescriptor::Str, TypeDescriptor::Path]));
        str_first.set("foo/bar").unwrap();
        assert_eq!(str_first.get().unwrap(), Value::Str("foo/bar".to_string()));

        let path_first = prop("b", TypeDescriptor::union([TypeDescriptor::Path, TypeDescriptor::Str]));
        path_first.set("foo/bar").unwrap();
        assert_eq!(path_first.get().unwrap(), Value::Path(PathBuf::from("foo/bar")));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let p = prop("count", TypeDescriptor::Int);
        let err = p.set("not a number").unwrap_err();
        assert!(matches!(err, PropertyError::TypeMismatch { .. }));
        assert!(!p.is_set());
    }

    #[test]
    fn test_list_and_optional_adapt_elementwise() {
        let paths = prop("paths", TypeDescriptor::list(TypeDescriptor::Path));
        paths.set(vec!["a", "b"]).unwrap();
        assert_eq!(
            paths.get().unwrap(),
            Value::List(vec![Value::Path("a".into()), Value::Path("b".into())])
        );

        let maybe = prop("maybe", TypeDescriptor::optional(TypeDescriptor::Int));
        maybe.set(Value::None).unwrap();
        assert_eq!(maybe.get().unwrap(), Value::None);
        maybe.set(3).unwrap();
        assert_eq!(maybe.get().unwrap(), Value::Int(3));
    }

    #[test]
    fn test_empty_property() {
        let p = prop("name", TypeDescriptor::Str);
        assert!(p.is_empty());
        assert!(!p.is_set());
        let err = p.get().unwrap_err();
        assert!(err.is_empty());
        assert_eq!(
            err.to_string(),
            "the value of Property(:task.name) is empty"
        );

        p.seterror("please configure a name");
        assert_eq!(
            p.get().unwrap_err().to_string(),
            "please configure a name (Property(:task.name))"
        );
        assert_eq!(p.get_or("fallback").unwrap(), Value::Str("fallback".into()));
    }

    #[test]
    fn test_output_property_is_deferred_not_empty() {
        let out = Property::new(owner(":producer"), "out", TypeDescriptor::Str, true);
        let err = out.get().unwrap_err();
        assert!(err.is_deferred());
        assert!(!err.is_empty());
        assert!(out.is_empty());
        assert!(!out.is_set());

        out.set("produced").unwrap();
        assert_eq!(out.get().unwrap(), Value::Str("produced".into()));
        assert!(out.is_filled());
    }

    #[test]
    fn test_alias_reads_through_and_stays_deferred() {
        let out = Property::new(owner(":producer"), "out", TypeDescriptor::Str, true);
        let input = prop("input", TypeDescriptor::Str);
        input.set_supplier(&out).unwrap();

        assert!(input.get().unwrap_err().is_deferred());
        assert!(input.is_set());

        out.set("later").unwrap();
        assert_eq!(input.get().unwrap(), Value::Str("later".into()));
    }

    #[test]
    fn test_setmap_is_lazy() {
        let source = prop("source", TypeDescriptor::Int);
        let derived = prop("derived", TypeDescriptor::Int);
        derived.set_supplier(&source).unwrap();
        derived
            .setmap(|v| match v {
                Value::Int(i) => Ok(Value::Int(i * 2)),
                other => Err(PropertyError::Other(format!("unexpected {other}"))),
            })
            .unwrap();

        assert!(derived.get().unwrap_err().is_empty());
        source.set(21).unwrap();
        assert_eq!(derived.get().unwrap(), Value::Int(42));
    }

    #[test]
    fn test_setdefault_only_applies_when_unset() {
        let p = prop("p", TypeDescriptor::Str);
        p.setdefault("first").unwrap();
        p.setdefault("second").unwrap();
        assert_eq!(p.get().unwrap(), Value::Str("first".into()));
    }

    #[test]
    fn test_finalized_property_rejects_writes() {
        let p = prop("p", TypeDescriptor::Str);
        p.setfinal("fixed").unwrap();
        assert!(p.is_finalized());
        assert!(matches!(p.set("other"), Err(PropertyError::Finalized(_))));
        assert!(matches!(p.clear(), Err(PropertyError::Finalized(_))));
        assert_eq!(p.get().unwrap(), Value::Str("fixed".into()));
    }

    #[test]
    fn test_clear_resets_to_void() {
        let p = prop("p", TypeDescriptor::Str);
        p.set("x").unwrap();
        p.clear().unwrap();
        assert!(!p.is_set());
        assert!(p.get().unwrap_err().is_empty());
    }

    #[test]
    fn test_provides_and_get_of_type() {
        let files = prop("files", TypeDescriptor::list(TypeDescriptor::Path));
        assert!(files.provides(ValueKind::Path));
        assert!(files.provides(ValueKind::List));
        assert!(!files.provides(ValueKind::Str));

        files.set(vec!["a.txt", "b.txt"]).unwrap();
        assert_eq!(files.get_of_type(ValueKind::Path).unwrap().len(), 2);
        assert!(files.get_of_type(ValueKind::Str).unwrap().is_empty());

        let mixed = prop("mixed", TypeDescriptor::union([TypeDescriptor::Int, TypeDescriptor::Str]));
        assert!(mixed.provides(ValueKind::Str));
        mixed.set("x").unwrap();
        assert_eq!(mixed.get_of_type(ValueKind::Str).unwrap(), vec![Value::Str("x".into())]);
        assert!(mixed.get_of_type(ValueKind::Int).unwrap().is_empty());

        let optional = prop("opt", TypeDescriptor::optional(TypeDescriptor::Path));
        assert!(optional.provides(ValueKind::Path));
        assert!(optional.provides(ValueKind::None));
    }

    #[test]
    fn test_lineage_reaches_aliased_properties() {
        let upstream = Property::new(owner(":a"), "out", TypeDescriptor::Str, true);
        let middle = Property::new(owner(":b"), "mid", TypeDescriptor::Str, false);
        let downstream = Property::new(owner(":c"), "in", TypeDescriptor::Str, false);
        middle.set_supplier(&upstream).unwrap();
        downstream.set_supplier(&middle).unwrap();

        let owners: Vec<Address> = downstream
            .lineage()
            .into_iter()
            .filter_map(|(supplier, _)| supplier.as_property().map(|p| p.owner().clone()))
            .collect();
        assert_eq!(owners, vec![owner(":c"), owner(":b"), owner(":a")]);
    }

    #[test]
    fn test_lineage_includes_explicit_derivation() {
        let a = Property::new(owner(":a"), "x", TypeDescriptor::Int, false);
        let b = Property::new(owner(":b"), "y", TypeDescriptor::Int, false);
        b.set_derived(1, vec![Supplier::from(&a), Supplier::task(owner(":t"))])
            .unwrap();

        let lineage = b.lineage();
        assert!(lineage.iter().any(|(s, _)| s.as_property().is_some_and(|p| p.ptr_eq(&a))));
        assert!(lineage.iter().any(|(s, _)| s.as_task() == Some(&owner(":t"))));
    }

    #[test]
    fn test_lineage_terminates_on_cycles() {
        let a = Property::new(owner(":a"), "x", TypeDescriptor::Int, false);
        let b = Property::new(owner(":b"), "y", TypeDescriptor::Int, false);
        a.set_derived(1, vec![Supplier::from(&b)]).unwrap();
        b.set_derived(2, vec![Supplier::from(&a)]).unwrap();
        let lineage = a.lineage();
        assert!(lineage.len() <= 4);
        assert_eq!(a.get().unwrap(), Value::Int(1));
    }

    #[test]
    fn test_alias_cycle_is_rejected() {
        let a = Property::new(owner(":a"), "x", TypeDescriptor::Int, false);
        let b = Property::new(owner(":b"), "y", TypeDescriptor::Int, false);
        a.set_supplier(&b).unwrap();
        let err = b.set_supplier(&a).unwrap_err();
        assert!(err.to_string().contains("would create a cycle"), "{err}");

        b.set(5).unwrap();
        assert_eq!(a.get().unwrap(), Value::Int(5));
    }

    #[test]
    fn test_self_alias_is_rejected() {
        let p = prop("p", TypeDescriptor::Int);
        assert!(matches!(p.set_supplier(&p), Err(PropertyError::Other(_))));

        let c = Property::new(owner(":c"), "z", TypeDescriptor::Int, false);
        let mapped = Supplier::from(&p).map(Ok);
        p.set_supplier(&c).unwrap();
        assert!(c.set_supplier(mapped).is_err());
        assert!(p.is_set());
    }

    #[test]
    fn test_reading_itself_through_a_callable_fails() {
        let p = prop("p", TypeDescriptor::Int);
        let handle = p.clone();
        p.setcallable(move || handle.get(), Vec::new()).unwrap();
        let err = p.get().unwrap_err();
        assert!(err.to_string().contains("refers back to itself"), "{err}");
        // The read marker is released, so later reads fail the same way instead of hanging.
        assert!(p.get().is_err());
    }

    #[test]
    fn test_once_caches_first_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let supplier = Supplier::of_callable(
            move || Ok(Value::Int(counter.fetch_add(1, Ordering::SeqCst) as i64)),
            Vec::new(),
        )
        .once();
        assert_eq!(supplier.get().unwrap(), Value::Int(0));
        assert_eq!(supplier.get().unwrap(), Value::Int(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spec_defaults_are_per_instance() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let spec = PropertySpec::new("items", TypeDescriptor::list(TypeDescriptor::Int))
            .with_default_factory(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Value::List(Vec::new())
            });

        let first = spec.instantiate(&owner(":one")).unwrap();
        let second = spec.instantiate(&owner(":two")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        first.set(vec![1]).unwrap();
        assert_eq!(second.get().unwrap(), Value::List(Vec::new()));

        let literal = PropertySpec::new("flag", TypeDescriptor::Bool).with_default(true);
        assert_eq!(literal.instantiate(&owner(":x")).unwrap().get().unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_output_spec_starts_deferred() {
        let spec = PropertySpec::output("artifact", TypeDescriptor::Path).with_help("built file");
        let p = spec.instantiate(&owner(":build")).unwrap();
        assert!(p.is_output());
        assert_eq!(p.help().as_deref(), Some("built file"));
        assert!(p.get().unwrap_err().is_deferred());
    }
}
