use lintra_backend_expr::ExprTemplateBackend;

lintra_backend_tests::define_backend_tests!(expr_template_suite, || ExprTemplateBackend::new());
