// `geom` (geometry(Point, 4326)) has no diesel type; it is only read and
// written through raw SQL in `repo::addresses`.
table! {
    signalement_adresse (id_adresse) {
        id_adresse -> Int8,
        adresse -> Nullable<Text>,
        precision_localisation -> Nullable<Text>,
        fk_id_signalement -> Int8,
        is_adresse_rattrapee -> Bool,
    }
}
