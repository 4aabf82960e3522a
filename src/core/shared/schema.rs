// Diesel table definitions for the CRM schema. Keep in sync with the SQL
// under migrations/.

diesel::table! {
    employees (id) {
        id -> Int8,
        name -> Varchar,
        email -> Varchar,
        phone_number -> Nullable<Varchar>,
        address -> Nullable<Varchar>,
        city -> Nullable<Varchar>,
        state -> Nullable<Varchar>,
        role -> Int2,
        status -> Int2,
        password_hash -> Nullable<Varchar>,
        has_password -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    customers (id) {
        id -> Int8,
        name -> Varchar,
        email -> Varchar,
        phone_number -> Nullable<Varchar>,
        address -> Nullable<Varchar>,
        city -> Nullable<Varchar>,
        state -> Nullable<Varchar>,
        zip_code -> Nullable<Int4>,
        country -> Nullable<Varchar>,
        website -> Nullable<Varchar>,
        customer_type -> Int2,
        status -> Int2,
        password_hash -> Nullable<Varchar>,
        has_password -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Int8,
        title -> Varchar,
        description -> Nullable<Text>,
        status -> Int2,
        priority -> Int2,
        customer_id -> Nullable<Int8>,
        employee_id -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    resolved_tickets (id) {
        id -> Int8,
        title -> Varchar,
        ticket_description -> Nullable<Text>,
        resolve_description -> Text,
        original_ticket_id -> Int8,
        employee_id -> Nullable<Int8>,
        admin_id -> Nullable<Int8>,
        resolved_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Int8,
        name -> Varchar,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    leads (id) {
        id -> Int8,
        name -> Varchar,
        email -> Nullable<Varchar>,
        phone_number -> Nullable<Varchar>,
        company -> Nullable<Varchar>,
        address -> Nullable<Varchar>,
        city -> Nullable<Varchar>,
        state -> Nullable<Varchar>,
        zip_code -> Nullable<Varchar>,
        country -> Nullable<Varchar>,
        website -> Nullable<Varchar>,
        source -> Int2,
        status -> Int2,
        requirement -> Nullable<Varchar>,
        comment -> Nullable<Varchar>,
        expected_revenue -> Nullable<Numeric>,
        conversion_probability -> Nullable<Int2>,
        employee_id -> Nullable<Int8>,
        customer_id -> Nullable<Int8>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    quotations (id) {
        id -> Int8,
        title -> Varchar,
        description -> Nullable<Varchar>,
        amount -> Numeric,
        valid_until -> Date,
        stage -> Int2,
        customer_id -> Int8,
        employee_id -> Nullable<Int8>,
        sent_at -> Nullable<Timestamptz>,
        responded_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    invoices (id) {
        id -> Int8,
        invoice_number -> Varchar,
        title -> Varchar,
        customer_id -> Int8,
        quotation_id -> Nullable<Int8>,
        status -> Int2,
        subtotal -> Numeric,
        discount -> Numeric,
        tax_rate -> Numeric,
        tax_amount -> Numeric,
        total -> Numeric,
        invoice_date -> Date,
        due_date -> Date,
        notes -> Nullable<Varchar>,
        sent_at -> Nullable<Timestamptz>,
        paid_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    invoice_items (id) {
        id -> Int8,
        invoice_id -> Int8,
        position -> Int4,
        description -> Varchar,
        quantity -> Int4,
        unit_price -> Numeric,
        amount -> Numeric,
    }
}

diesel::joinable!(tickets -> customers (customer_id));
diesel::joinable!(quotations -> customers (customer_id));
diesel::joinable!(invoices -> customers (customer_id));
diesel::joinable!(invoice_items -> invoices (invoice_id));
diesel::joinable!(resolved_tickets -> tickets (original_ticket_id));

diesel::allow_tables_to_appear_in_same_query!(
    employees,
    customers,
    tickets,
    resolved_tickets,
    categories,
    leads,
    quotations,
    invoices,
    invoice_items,
);
