use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use regguard_agent::{InterceptionDispatcher, NameResolver};
use regguard_intercept::{
    DeleteKeyInformation, Notification, Registry, SetValueKeyInformation, UnicodeString,
};
use regguard_policy::StringFilters;
use regguard_protocol::{wide::to_wide, OperationKind};

fn make_filters(count: usize) -> StringFilters {
    let filters = StringFilters::new();
    for i in 0..count {
        let pattern = match i % 3 {
            0 => format!(r"\Config\Vendor{}\License", i),
            1 => format!(r"\Config\Vendor{}\*\Key", i),
            _ => format!(r"\Config\Vendor{}\**", i),
        };
        filters
            .add_filter(&pattern, OperationKind::ALL_FLAGS)
            .expect("bench pattern compiles");
    }
    filters
}

fn bench_resolve(c: &mut Criterion) {
    let registry = Arc::new(Registry::new());
    let key = registry
        .create_key(r"\Config\App\Settings")
        .expect("bench key created");
    let resolver = NameResolver::new(registry);
    let wide = to_wide("License");
    let name = UnicodeString::new(&wide);

    c.bench_function("resolve_full_path", |b| {
        b.iter(|| resolver.resolve(black_box(key), Some(black_box(&name))))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let registry = Arc::new(Registry::new());
    let key = registry
        .create_key(r"\Config\App\Settings")
        .expect("bench key created");
    let wide = to_wide("License");

    // 20 rules, none matching
    {
        let dispatcher =
            InterceptionDispatcher::new(registry.clone(), Arc::new(make_filters(20)));
        let n = Notification::PreSetValueKey(SetValueKeyInformation {
            object: key,
            value_name: Some(UnicodeString::new(&wide)),
            data: b"x",
        });
        c.bench_function("dispatch_set_value_miss_20", |b| {
            b.iter(|| dispatcher.dispatch(black_box(&n)))
        });
    }

    // one rule, matching
    {
        let filters = StringFilters::new();
        filters
            .add_filter(r"\Config\App\Settings\License", OperationKind::WRITE_FLAG)
            .expect("bench pattern compiles");
        let dispatcher = InterceptionDispatcher::new(registry.clone(), Arc::new(filters));
        let n = Notification::PreSetValueKey(SetValueKeyInformation {
            object: key,
            value_name: Some(UnicodeString::new(&wide)),
            data: b"x",
        });
        c.bench_function("dispatch_set_value_deny", |b| {
            b.iter(|| dispatcher.dispatch(black_box(&n)))
        });
    }

    // unrelated class, no resolution
    {
        let dispatcher =
            InterceptionDispatcher::new(registry.clone(), Arc::new(make_filters(20)));
        let n = Notification::PreDeleteKey(DeleteKeyInformation { object: key });
        c.bench_function("dispatch_other_class", |b| {
            b.iter(|| dispatcher.dispatch(black_box(&n)))
        });
    }
}

criterion_group!(benches, bench_resolve, bench_dispatch);
criterion_main!(benches);
